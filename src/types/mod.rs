//! C-like type descriptors and the session-wide type database.
//!
//! Every type the debugger knows about lives in one [`TypeDatabase`], built
//! during debug-info ingestion and grown on demand for synthesized types
//! (pointer-to-existing, user casts). Descriptors never move and are never
//! freed before session end, so a [`TypeId`] handle stays valid for the
//! whole session. Cross-references between descriptors are handles into the
//! same database, not pointers.
//!
//! # Key Components
//!
//! - [`TypeId`] - Index handle into the database
//! - [`TypeKind`] - One explicit variant per descriptor kind
//! - [`TypeDatabase`] - Arena, interning, sizing, and typed address math
//!
//! # Invariants
//!
//! - A struct's field layout never changes once it is finalized by
//!   [`TypeDatabase::set_struct_size`]; ingestion adds fields one at a time
//!   before that point.
//! - Pointer types with the same target are interned, so handle equality is
//!   a valid "same pointee type" test.
//! - Array indexing performs no bounds check against the declared range;
//!   an out-of-range index simply computes `base + i * element_size`.

use std::collections::HashMap;

use crate::address::{Address, AddressSpace};
use crate::memory::{self, TargetMemory};
use crate::{Error, Result};

/// Width of a pointer in the emulated target, in bytes.
pub const POINTER_SIZE: u32 = 4;

/// Stable handle to a descriptor in a [`TypeDatabase`].
///
/// Handles are plain indices; they are only meaningful against the database
/// that issued them and stay valid for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// Returns the raw index of this handle.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Descriptor kind selector for [`TypeDatabase::new_type`] and
/// [`TypeDatabase::type_cast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// Basic scalar type
    Basic,
    /// Const-qualified wrapper
    Const,
    /// Pointer to another descriptor
    Pointer,
    /// Array with declared bounds
    Array,
    /// Struct with ordered fields
    Struct,
    /// Enumeration
    Enum,
    /// Named alias of another descriptor
    Typedef,
    /// Function signature
    Function,
    /// Bit slice of a container scalar
    Bitfield,
}

/// One named member of a struct descriptor.
#[derive(Debug, Clone)]
pub struct StructField {
    /// Field name
    pub name: String,
    /// Field type, if the ingester resolved one
    pub type_id: Option<TypeId>,
    /// Byte offset from the start of the struct
    pub offset: u32,
    /// Field size in bytes
    pub size: u32,
}

/// A type descriptor; each variant carries only the fields relevant to its
/// kind.
///
/// Cross-references are [`TypeId`] handles. A reference still `None` is a
/// descriptor under construction (ingestion fills pointer targets and array
/// elements as it learns them).
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// Basic scalar: `int`, `char`, ...
    Basic {
        /// Type name as the user writes it
        name: String,
        /// Size in bytes
        size: u32,
        /// Whether values sign-extend
        signed: bool,
    },
    /// Const-qualified view of an inner type.
    Const {
        /// The qualified type
        inner: Option<TypeId>,
    },
    /// Pointer to a target type.
    Pointer {
        /// The pointee
        target: Option<TypeId>,
    },
    /// Array with declared (but unenforced) bounds.
    Array {
        /// Smallest declared index
        min: i64,
        /// Largest declared index
        max: i64,
        /// Element type
        element: Option<TypeId>,
    },
    /// Struct with an ordered field list.
    Struct {
        /// Struct tag
        name: String,
        /// Ordered members
        fields: Vec<StructField>,
        /// Total size once known
        size: Option<u32>,
        /// Set once the layout is complete; fields are immutable after
        finalized: bool,
    },
    /// Enumeration with named members.
    Enum {
        /// Enum tag
        name: String,
        /// Member name/value pairs in declaration order
        members: Vec<(String, i64)>,
    },
    /// Named alias of another descriptor.
    Typedef {
        /// Alias name
        name: String,
        /// Aliased type
        inner: Option<TypeId>,
    },
    /// Function signature; only the return type matters to the evaluator.
    Function {
        /// Function type name
        name: String,
        /// Return type
        return_type: Option<TypeId>,
    },
    /// Bit slice within a container scalar.
    Bitfield {
        /// Bit offset from the container's least significant bit
        bit_offset: u32,
        /// Width in bits
        bits: u32,
        /// Container type
        base: Option<TypeId>,
    },
}

/// Arena of all type descriptors for one debug session.
///
/// Construction pre-seeds the C basic types and the constant types the
/// expression parser needs ([`int_type`](TypeDatabase::int_type),
/// [`uint_type`](TypeDatabase::uint_type),
/// [`string_type`](TypeDatabase::string_type)).
///
/// # Examples
///
/// ```rust
/// use winscope::types::{TypeClass, TypeDatabase};
///
/// let mut types = TypeDatabase::new();
/// let point = types.new_type(TypeClass::Struct, "point");
/// let int = types.int_type();
/// types.add_struct_field(point, "x", Some(int), 0, 4)?;
/// types.add_struct_field(point, "y", Some(int), 4, 4)?;
/// types.set_struct_size(point, 8)?;
/// assert_eq!(types.object_size(point), 8);
/// # Ok::<(), winscope::Error>(())
/// ```
#[derive(Debug)]
pub struct TypeDatabase {
    entries: Vec<TypeKind>,
    pointer_cache: HashMap<TypeId, TypeId>,
    int_type: TypeId,
    uint_type: TypeId,
    char_type: TypeId,
    string_type: TypeId,
}

impl TypeDatabase {
    /// Creates a database pre-seeded with the C basic types.
    #[must_use]
    pub fn new() -> TypeDatabase {
        let mut db = TypeDatabase {
            entries: Vec::new(),
            pointer_cache: HashMap::new(),
            int_type: TypeId(0),
            uint_type: TypeId(0),
            char_type: TypeId(0),
            string_type: TypeId(0),
        };

        db.new_basic("void", 0, false);
        db.char_type = db.new_basic("char", 1, true);
        db.new_basic("unsigned char", 1, false);
        db.new_basic("short int", 2, true);
        db.new_basic("short unsigned int", 2, false);
        db.int_type = db.new_basic("int", 4, true);
        db.uint_type = db.new_basic("unsigned int", 4, false);
        db.new_basic("long int", 4, true);
        db.new_basic("long unsigned int", 4, false);
        db.string_type = db.find_or_make_pointer_type(db.char_type);
        db
    }

    /// The type of signed integer constants built by the parser.
    #[must_use]
    pub fn int_type(&self) -> TypeId {
        self.int_type
    }

    /// The type of unsigned integer constants built by the parser.
    #[must_use]
    pub fn uint_type(&self) -> TypeId {
        self.uint_type
    }

    /// The type of string constants built by the parser (`char *`).
    #[must_use]
    pub fn string_type(&self) -> TypeId {
        self.string_type
    }

    /// Looks at the descriptor behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this database.
    #[must_use]
    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.entries[id.index()]
    }

    fn push(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(self.entries.len() as u32);
        self.entries.push(kind);
        id
    }

    /// Creates a basic scalar type with an explicit size and signedness.
    pub fn new_basic(&mut self, name: &str, size: u32, signed: bool) -> TypeId {
        self.push(TypeKind::Basic {
            name: name.to_string(),
            size,
            signed,
        })
    }

    /// Creates a fresh descriptor of the given class.
    ///
    /// Cross-references (pointer target, array element, typedef inner) start
    /// unset; ingestion fills them through the setter operations. A basic
    /// type created this way defaults to a 4-byte signed scalar; use
    /// [`new_basic`](TypeDatabase::new_basic) when the size is known.
    pub fn new_type(&mut self, class: TypeClass, name: &str) -> TypeId {
        let kind = match class {
            TypeClass::Basic => TypeKind::Basic {
                name: name.to_string(),
                size: 4,
                signed: true,
            },
            TypeClass::Const => TypeKind::Const { inner: None },
            TypeClass::Pointer => TypeKind::Pointer { target: None },
            TypeClass::Array => TypeKind::Array {
                min: 0,
                max: 0,
                element: None,
            },
            TypeClass::Struct => TypeKind::Struct {
                name: name.to_string(),
                fields: Vec::new(),
                size: None,
                finalized: false,
            },
            TypeClass::Enum => TypeKind::Enum {
                name: name.to_string(),
                members: Vec::new(),
            },
            TypeClass::Typedef => TypeKind::Typedef {
                name: name.to_string(),
                inner: None,
            },
            TypeClass::Function => TypeKind::Function {
                name: name.to_string(),
                return_type: None,
            },
            TypeClass::Bitfield => TypeKind::Bitfield {
                bit_offset: 0,
                bits: 0,
                base: None,
            },
        };
        self.push(kind)
    }

    /// Appends a field to a struct under construction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the handle is not a struct or the
    /// struct has already been finalized.
    pub fn add_struct_field(
        &mut self,
        id: TypeId,
        name: &str,
        type_id: Option<TypeId>,
        offset: u32,
        size: u32,
    ) -> Result<()> {
        match &mut self.entries[id.index()] {
            TypeKind::Struct {
                fields, finalized, ..
            } => {
                if *finalized {
                    return Err(Error::TypeMismatch(
                        "cannot add fields to a finalized struct".to_string(),
                    ));
                }
                fields.push(StructField {
                    name: name.to_string(),
                    type_id,
                    offset,
                    size,
                });
                Ok(())
            }
            _ => Err(Error::TypeMismatch("not a struct type".to_string())),
        }
    }

    /// Records the total size of a struct and finalizes its layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the handle is not a struct.
    pub fn set_struct_size(&mut self, id: TypeId, size: u32) -> Result<()> {
        match &mut self.entries[id.index()] {
            TypeKind::Struct {
                size: slot,
                finalized,
                ..
            } => {
                *slot = Some(size);
                *finalized = true;
                Ok(())
            }
            _ => Err(Error::TypeMismatch("not a struct type".to_string())),
        }
    }

    /// Sets the pointee of a pointer descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the handle is not a pointer.
    pub fn set_pointer_target(&mut self, id: TypeId, target: TypeId) -> Result<()> {
        match &mut self.entries[id.index()] {
            TypeKind::Pointer { target: slot } => {
                *slot = Some(target);
                Ok(())
            }
            _ => Err(Error::TypeMismatch("not a pointer type".to_string())),
        }
    }

    /// Sets the inner type of a const or typedef descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] for any other descriptor kind.
    pub fn set_inner_type(&mut self, id: TypeId, inner: TypeId) -> Result<()> {
        match &mut self.entries[id.index()] {
            TypeKind::Const { inner: slot } | TypeKind::Typedef { inner: slot, .. } => {
                *slot = Some(inner);
                Ok(())
            }
            _ => Err(Error::TypeMismatch("not a const or typedef type".to_string())),
        }
    }

    /// Sets the declared bounds and element type of an array descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the handle is not an array.
    pub fn set_array_bounds(
        &mut self,
        id: TypeId,
        min: i64,
        max: i64,
        element: TypeId,
    ) -> Result<()> {
        match &mut self.entries[id.index()] {
            TypeKind::Array {
                min: lo,
                max: hi,
                element: slot,
            } => {
                *lo = min;
                *hi = max;
                *slot = Some(element);
                Ok(())
            }
            _ => Err(Error::TypeMismatch("not an array type".to_string())),
        }
    }

    /// Sets the bit range and container of a bitfield descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the handle is not a bitfield.
    pub fn set_bitfield(&mut self, id: TypeId, bit_offset: u32, bits: u32, base: TypeId) -> Result<()> {
        match &mut self.entries[id.index()] {
            TypeKind::Bitfield {
                bit_offset: off,
                bits: width,
                base: slot,
            } => {
                *off = bit_offset;
                *width = bits;
                *slot = Some(base);
                Ok(())
            }
            _ => Err(Error::TypeMismatch("not a bitfield type".to_string())),
        }
    }

    /// Sets the return type of a function descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the handle is not a function.
    pub fn set_return_type(&mut self, id: TypeId, return_type: TypeId) -> Result<()> {
        match &mut self.entries[id.index()] {
            TypeKind::Function { return_type: slot, .. } => {
                *slot = Some(return_type);
                Ok(())
            }
            _ => Err(Error::TypeMismatch("not a function type".to_string())),
        }
    }

    /// Appends a named member to an enum descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the handle is not an enum.
    pub fn add_enum_member(&mut self, id: TypeId, name: &str, value: i64) -> Result<()> {
        match &mut self.entries[id.index()] {
            TypeKind::Enum { members, .. } => {
                members.push((name.to_string(), value));
                Ok(())
            }
            _ => Err(Error::TypeMismatch("not an enum type".to_string())),
        }
    }

    /// Duplicates all current fields of `src` into `dst`.
    ///
    /// Used while ingesting anonymous-union-like layouts where one struct
    /// borrows another's members.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] unless both handles are structs and
    /// `dst` is not finalized.
    pub fn copy_field_list(&mut self, dst: TypeId, src: TypeId) -> Result<()> {
        let copied = match &self.entries[src.index()] {
            TypeKind::Struct { fields, .. } => fields.clone(),
            _ => return Err(Error::TypeMismatch("source is not a struct type".to_string())),
        };
        match &mut self.entries[dst.index()] {
            TypeKind::Struct {
                fields, finalized, ..
            } => {
                if *finalized {
                    return Err(Error::TypeMismatch(
                        "cannot add fields to a finalized struct".to_string(),
                    ));
                }
                fields.extend(copied);
                Ok(())
            }
            _ => Err(Error::TypeMismatch("destination is not a struct type".to_string())),
        }
    }

    /// Returns the interned pointer type for the given target, creating it
    /// on first request.
    ///
    /// Repeated calls with the same target return the same handle, so
    /// handle equality answers "same pointee type".
    pub fn find_or_make_pointer_type(&mut self, target: TypeId) -> TypeId {
        if let Some(existing) = self.pointer_cache.get(&target) {
            return *existing;
        }
        let id = self.push(TypeKind::Pointer {
            target: Some(target),
        });
        self.pointer_cache.insert(target, id);
        id
    }

    /// Resolves typedef and const wrappers down to the underlying type.
    ///
    /// A wrapper whose inner reference is still unset resolves to itself.
    #[must_use]
    pub fn strip(&self, id: TypeId) -> TypeId {
        let mut current = id;
        loop {
            match &self.entries[current.index()] {
                TypeKind::Typedef {
                    inner: Some(next), ..
                }
                | TypeKind::Const { inner: Some(next) } => current = *next,
                _ => return current,
            }
        }
    }

    /// Whether values of this type sign-extend when widened.
    #[must_use]
    pub fn is_signed(&self, id: TypeId) -> bool {
        match &self.entries[self.strip(id).index()] {
            TypeKind::Basic { signed, .. } => *signed,
            TypeKind::Enum { .. } => true,
            TypeKind::Bitfield { base, .. } => base.map(|b| self.is_signed(b)).unwrap_or(false),
            _ => false,
        }
    }

    /// The pointee of a pointer type, if the handle is a (possibly
    /// wrapped) pointer with a known target.
    #[must_use]
    pub fn pointer_target(&self, id: TypeId) -> Option<TypeId> {
        match &self.entries[self.strip(id).index()] {
            TypeKind::Pointer { target } => *target,
            _ => None,
        }
    }

    /// Computes the storage size of a type in bytes.
    ///
    /// Struct: the declared size, or the maximum `offset + size` over its
    /// fields when no size was declared (correct regardless of field
    /// insertion order). Array: `element_size * (max - min + 1)`. Pointer
    /// and function: native pointer width. Bitfield: the container size, or
    /// `ceil(bits / 8)` if the container is unknown.
    #[must_use]
    pub fn object_size(&self, id: TypeId) -> u32 {
        match &self.entries[id.index()] {
            TypeKind::Basic { size, .. } => *size,
            TypeKind::Const { inner } | TypeKind::Typedef { inner, .. } => {
                inner.map(|t| self.object_size(t)).unwrap_or(0)
            }
            TypeKind::Pointer { .. } | TypeKind::Function { .. } => POINTER_SIZE,
            TypeKind::Array { min, max, element } => {
                let elem = element.map(|t| self.object_size(t)).unwrap_or(0);
                let count = (max - min + 1).max(0) as u32;
                elem.saturating_mul(count)
            }
            TypeKind::Struct { size, fields, .. } => size.unwrap_or_else(|| {
                fields
                    .iter()
                    .map(|f| f.offset + f.size)
                    .max()
                    .unwrap_or(0)
            }),
            TypeKind::Enum { .. } => 4,
            TypeKind::Bitfield { bits, base, .. } => base
                .map(|b| self.object_size(b))
                .unwrap_or_else(|| bits.div_ceil(8)),
        }
    }

    /// Follows the pointer stored at `addr`, yielding the pointee address
    /// and type.
    ///
    /// For an array the address is already the first element; it is
    /// returned unchanged with the element type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAPointer`] if the type is neither pointer nor
    /// array (or its references were never filled in), and propagates
    /// resolution/validation failures from the pointer load.
    pub fn dereference_pointer(
        &self,
        space: &AddressSpace,
        mem: &dyn TargetMemory,
        addr: &Address,
        type_id: TypeId,
        default_segment: u32,
    ) -> Result<(Address, TypeId)> {
        match &self.entries[self.strip(type_id).index()] {
            TypeKind::Pointer { target: Some(target) } => {
                let value = memory::read_u32(space, mem, addr, default_segment)?;
                Ok((Address::new(addr.segment, value), *target))
            }
            TypeKind::Array {
                element: Some(element),
                ..
            } => Ok((*addr, *element)),
            _ => Err(Error::NotAPointer),
        }
    }

    /// Locates a named field within a struct at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchField`] if the struct declares no such field
    /// and [`Error::TypeMismatch`] if the type is not a struct or the field
    /// was ingested without a type.
    pub fn find_struct_element(
        &self,
        addr: &Address,
        type_id: TypeId,
        field_name: &str,
    ) -> Result<(Address, TypeId)> {
        match &self.entries[self.strip(type_id).index()] {
            TypeKind::Struct { fields, .. } => {
                let field = fields
                    .iter()
                    .find(|f| f.name == field_name)
                    .ok_or_else(|| Error::NoSuchField(field_name.to_string()))?;
                let field_type = field.type_id.ok_or_else(|| {
                    Error::TypeMismatch(format!("field '{field_name}' has no type"))
                })?;
                Ok((addr.advanced(field.offset), field_type))
            }
            _ => Err(Error::TypeMismatch("not a struct type".to_string())),
        }
    }

    /// Computes the address and type of element `index` of an array.
    ///
    /// Deliberately performs no bounds check against the declared range;
    /// any index computes `base + index * element_size`, matching the
    /// permissive C semantics of the original.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAPointer`] if the type is not an array with a
    /// known element type.
    pub fn array_index(
        &self,
        addr: &Address,
        type_id: TypeId,
        index: i64,
    ) -> Result<(Address, TypeId)> {
        match &self.entries[self.strip(type_id).index()] {
            TypeKind::Array {
                element: Some(element),
                ..
            } => {
                let elem_size = i64::from(self.object_size(*element));
                let delta = index.wrapping_mul(elem_size) as u32;
                Ok((addr.advanced(delta), *element))
            }
            _ => Err(Error::NotAPointer),
        }
    }

    /// Finds or synthesizes a type for a user-driven cast.
    ///
    /// Reuses an existing descriptor of the same class and name when one
    /// exists (ingestion-built or from an earlier cast), otherwise creates
    /// a fresh one.
    pub fn type_cast(&mut self, class: TypeClass, name: &str) -> TypeId {
        let found = self.entries.iter().position(|kind| match (class, kind) {
            (TypeClass::Basic, TypeKind::Basic { name: n, .. })
            | (TypeClass::Struct, TypeKind::Struct { name: n, .. })
            | (TypeClass::Enum, TypeKind::Enum { name: n, .. })
            | (TypeClass::Typedef, TypeKind::Typedef { name: n, .. })
            | (TypeClass::Function, TypeKind::Function { name: n, .. }) => n == name,
            _ => false,
        });
        match found {
            Some(index) => TypeId(index as u32),
            None => self.new_type(class, name),
        }
    }
}

impl Default for TypeDatabase {
    fn default() -> Self {
        TypeDatabase::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BufferMemory;

    #[test]
    fn pointer_interning_same_target_same_handle() {
        let mut types = TypeDatabase::new();
        let int = types.int_type();
        let uint = types.uint_type();

        let p1 = types.find_or_make_pointer_type(int);
        let p2 = types.find_or_make_pointer_type(int);
        let p3 = types.find_or_make_pointer_type(uint);

        assert_eq!(p1, p2);
        assert_ne!(p1, p3);
    }

    #[test]
    fn struct_size_from_out_of_order_fields() {
        let mut types = TypeDatabase::new();
        let int = types.int_type();
        let s = types.new_type(TypeClass::Struct, "s");

        // Fields inserted out of offset order; size still comes from the
        // maximum offset + size.
        types.add_struct_field(s, "tail", Some(int), 12, 4).unwrap();
        types.add_struct_field(s, "head", Some(int), 0, 4).unwrap();
        types.add_struct_field(s, "mid", Some(int), 4, 8).unwrap();

        assert_eq!(types.object_size(s), 16);
    }

    #[test]
    fn finalized_struct_rejects_new_fields() {
        let mut types = TypeDatabase::new();
        let int = types.int_type();
        let s = types.new_type(TypeClass::Struct, "s");
        types.add_struct_field(s, "a", Some(int), 0, 4).unwrap();
        types.set_struct_size(s, 4).unwrap();

        let err = types.add_struct_field(s, "b", Some(int), 4, 4).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
        assert_eq!(types.object_size(s), 4);
    }

    #[test]
    fn array_size_uses_declared_bounds() {
        let mut types = TypeDatabase::new();
        let int = types.int_type();
        let arr = types.new_type(TypeClass::Array, "");
        types.set_array_bounds(arr, 2, 5, int).unwrap();
        assert_eq!(types.object_size(arr), 16);
    }

    #[test]
    fn array_index_ignores_declared_bounds() {
        let mut types = TypeDatabase::new();
        let int = types.int_type();
        let arr = types.new_type(TypeClass::Array, "");
        types.set_array_bounds(arr, 0, 5, int).unwrap();

        let (addr, elem) = types
            .array_index(&Address::flat(0x2000), arr, 10)
            .unwrap();
        assert_eq!(addr.offset, 0x2028);
        assert_eq!(elem, int);
    }

    #[test]
    fn typedef_chain_strips_to_base() {
        let mut types = TypeDatabase::new();
        let int = types.int_type();
        let alias = types.new_type(TypeClass::Typedef, "DWORD");
        types.set_inner_type(alias, int).unwrap();
        let constant = types.new_type(TypeClass::Const, "");
        types.set_inner_type(constant, alias).unwrap();

        assert_eq!(types.strip(constant), int);
        assert_eq!(types.object_size(constant), 4);
    }

    #[test]
    fn dereference_reads_pointer_value() {
        let mut types = TypeDatabase::new();
        let int = types.int_type();
        let ptr = types.find_or_make_pointer_type(int);

        let space = AddressSpace::new();
        let mut mem = BufferMemory::new(0x1000, 0x100);
        crate::memory::write_scalar(&space, &mut mem, &Address::flat(0x1010), 0, 0x1040, 4)
            .unwrap();

        let (addr, new_type) = types
            .dereference_pointer(&space, &mem, &Address::flat(0x1010), ptr, 0)
            .unwrap();
        assert_eq!(addr.offset, 0x1040);
        assert_eq!(new_type, int);
    }

    #[test]
    fn dereference_of_basic_fails() {
        let types = TypeDatabase::new();
        let space = AddressSpace::new();
        let mem = BufferMemory::new(0, 16);
        let err = types
            .dereference_pointer(&space, &mem, &Address::flat(0), types.int_type(), 0)
            .unwrap_err();
        assert!(matches!(err, Error::NotAPointer));
    }

    #[test]
    fn struct_element_offsets_address() {
        let mut types = TypeDatabase::new();
        let int = types.int_type();
        let s = types.new_type(TypeClass::Struct, "point");
        types.add_struct_field(s, "x", Some(int), 0, 4).unwrap();
        types.add_struct_field(s, "y", Some(int), 4, 4).unwrap();

        let (addr, ty) = types
            .find_struct_element(&Address::flat(0x3000), s, "y")
            .unwrap();
        assert_eq!(addr.offset, 0x3004);
        assert_eq!(ty, int);

        let err = types
            .find_struct_element(&Address::flat(0x3000), s, "z")
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchField(name) if name == "z"));
    }

    #[test]
    fn copy_field_list_duplicates_members() {
        let mut types = TypeDatabase::new();
        let int = types.int_type();
        let src = types.new_type(TypeClass::Struct, "u_inner");
        types.add_struct_field(src, "raw", Some(int), 0, 4).unwrap();
        let dst = types.new_type(TypeClass::Struct, "u_outer");
        types.copy_field_list(dst, src).unwrap();

        assert!(types.find_struct_element(&Address::flat(0), dst, "raw").is_ok());
    }

    #[test]
    fn type_cast_reuses_existing_descriptor() {
        let mut types = TypeDatabase::new();
        let s = types.new_type(TypeClass::Struct, "window");
        let cast = types.type_cast(TypeClass::Struct, "window");
        assert_eq!(cast, s);

        let fresh = types.type_cast(TypeClass::Struct, "dialog");
        assert_ne!(fresh, s);
    }

    #[test]
    fn bitfield_size_prefers_container() {
        let mut types = TypeDatabase::new();
        let int = types.int_type();
        let bf = types.new_type(TypeClass::Bitfield, "");
        types.set_bitfield(bf, 3, 5, int).unwrap();
        assert_eq!(types.object_size(bf), 4);

        let bare = types.new_type(TypeClass::Bitfield, "");
        match &mut types.entries[bare.index()] {
            TypeKind::Bitfield { bits, .. } => *bits = 12,
            _ => unreachable!(),
        }
        assert_eq!(types.object_size(bare), 2);
    }
}
