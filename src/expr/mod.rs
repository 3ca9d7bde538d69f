//! Typed expression trees and their evaluation.
//!
//! The command front end parses user text into [`Expr`] trees; the engine
//! evaluates them against live emulated process state. A tree is built once
//! and may be evaluated arbitrarily often (watch expressions re-evaluate at
//! every stop), always re-reading target memory because the process may
//! have run in between.
//!
//! # Ownership
//!
//! Each tree has a single exclusive owner; children are owned boxes, never
//! shared between parents. `Clone` produces an independent deep copy, so a
//! long-lived watch expression is never aliased with a transient one.
//!
//! # Evaluation
//!
//! [`evaluate`] yields a [`TypedValue`]: an address-and-type pair whose
//! [`Place`] distinguishes a memory lvalue from an immediate pseudo-address
//! (constants, register reads, pointer arithmetic results). Taking the
//! address of an immediate fails with
//! [`Error::NotAnLvalue`](crate::Error::NotAnLvalue). Any failure is
//! wrapped as [`Error::Eval`](crate::Error::Eval) at the evaluation
//! boundary so that one broken expression never poisons the others.

use crate::address::{Address, AddressSpace};
use crate::memory::{self, TargetMemory};
use crate::registers::{CpuContext, Register};
use crate::symbols::{LocalLocation, SymbolId, SymbolTable};
use crate::types::{TypeDatabase, TypeId, TypeKind};
use crate::{Error, Result};

/// Binary operators of the expression grammar, C semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+` (scales by pointee size when one side is a pointer)
    Add,
    /// `-` (pointer difference yields an element count)
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `&&`
    LogicalAnd,
    /// `||`
    LogicalOr,
}

/// Unary operators of the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `~`
    BitNot,
    /// `!`
    LogicalNot,
    /// `*`
    Deref,
    /// `&`
    AddressOf,
}

/// A node of a debugger expression tree.
///
/// Construction mirrors the grammar one node per production; every child is
/// owned. Cloning is deep.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A CPU register of the selected frame
    Register(Register),
    /// A symbol or in-scope local, by name
    Symbol(String),
    /// Signed integer constant
    IntConst(i64),
    /// Unsigned integer constant
    UIntConst(u64),
    /// String constant
    StringConst(String),
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Raw `segment:offset` address, bypassing symbol lookup
    SegAddr {
        /// Segment sub-expression
        segment: Box<Expr>,
        /// Offset sub-expression
        offset: Box<Expr>,
    },
    /// Struct member access, `.` or `->`
    Field {
        /// The struct (or pointer to struct) expression
        base: Box<Expr>,
        /// Member name
        name: String,
        /// True for `->`: dereference the base first
        via_pointer: bool,
    },
    /// Array subscript
    Index {
        /// The array or pointer expression
        base: Box<Expr>,
        /// The index expression
        index: Box<Expr>,
    },
    /// Call of a debugger builtin
    Call {
        /// Builtin name
        name: String,
        /// Argument expressions
        args: Vec<Expr>,
    },
    /// Reinterpret the operand under another type, moving no bytes
    Cast {
        /// Target type
        type_id: TypeId,
        /// Operand
        operand: Box<Expr>,
    },
}

/// Where an evaluation result lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Place {
    /// An lvalue: the bytes sit at this address in the target
    Memory(Address),
    /// An immediate with no memory backing
    Immediate(i64),
    /// A string constant held by the debugger itself
    Str(String),
}

/// The result of evaluating an expression: a place tagged with a type.
#[derive(Debug, Clone)]
pub struct TypedValue {
    /// Where the value lives
    pub place: Place,
    /// Its type
    pub type_id: TypeId,
}

impl TypedValue {
    /// The memory address of an lvalue result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAnLvalue`] for immediates and string constants.
    pub fn address(&self) -> Result<Address> {
        match &self.place {
            Place::Memory(addr) => Ok(*addr),
            _ => Err(Error::NotAnLvalue),
        }
    }
}

/// Everything evaluation needs from the session, borrowed for one call.
///
/// Registers come from the currently selected frame (the live CPU context
/// when frame 0 has focus); `current_function` and `pc_offset` scope local
/// variables; `line` narrows symbol lookups the way the original resolved
/// file-static names.
pub struct EvalContext<'a> {
    /// Type database; mutable because address-of may intern pointer types
    pub types: &'a mut TypeDatabase,
    /// Symbol table
    pub symbols: &'a SymbolTable,
    /// Address space for resolution
    pub space: &'a AddressSpace,
    /// Target memory, re-read on every evaluation
    pub memory: &'a dyn TargetMemory,
    /// Register set of the selected frame
    pub registers: CpuContext,
    /// Function enclosing the selected frame's pc, for locals
    pub current_function: Option<SymbolId>,
    /// pc offset relative to that function's start
    pub pc_offset: Option<u32>,
    /// Source line context for scoped name lookup
    pub line: Option<u32>,
    /// Frame base of the selected frame, for stack locals
    pub frame_base: u32,
}

impl EvalContext<'_> {
    fn data_segment(&self) -> u32 {
        self.registers.ds
    }

    fn stack_segment(&self) -> u32 {
        self.registers.ss
    }
}

/// Loads the scalar value behind an evaluation result.
///
/// Immediates yield themselves. Memory lvalues are read live from the
/// target, sized by the type and sign-extended when the type is signed;
/// bitfields read their container and extract the declared bit range.
///
/// # Errors
///
/// String constants have no scalar value ([`Error::TypeMismatch`]); memory
/// reads propagate resolution and validation failures.
pub fn load(ctx: &EvalContext<'_>, value: &TypedValue) -> Result<i64> {
    match &value.place {
        Place::Immediate(v) => Ok(*v),
        Place::Str(_) => Err(Error::TypeMismatch(
            "string constant used as a number".to_string(),
        )),
        Place::Memory(addr) => {
            if let &TypeKind::Bitfield {
                bit_offset,
                bits,
                base,
            } = ctx.types.kind(ctx.types.strip(value.type_id))
            {
                let container = base.map(|b| ctx.types.object_size(b)).unwrap_or(4);
                let raw = memory::read_scalar(
                    ctx.space,
                    ctx.memory,
                    addr,
                    ctx.data_segment(),
                    container,
                )?;
                let width = bits.min(63);
                let mask = (1u64 << width) - 1;
                let field = (raw >> bit_offset) & mask;
                let signed = base.map(|b| ctx.types.is_signed(b)).unwrap_or(false);
                if signed && width > 0 && (field >> (width - 1)) & 1 == 1 {
                    return Ok((field | !mask) as i64);
                }
                return Ok(field as i64);
            }

            let size = ctx.types.object_size(value.type_id);
            let raw = memory::read_scalar(ctx.space, ctx.memory, addr, ctx.data_segment(), size)?;
            if ctx.types.is_signed(value.type_id) {
                Ok(match size {
                    1 => i64::from(raw as u8 as i8),
                    2 => i64::from(raw as u16 as i16),
                    _ => i64::from(raw as u32 as i32),
                })
            } else {
                Ok(raw as i64)
            }
        }
    }
}

/// Evaluates an expression tree against the given context.
///
/// # Errors
///
/// Every failure comes back wrapped as [`Error::Eval`]; the underlying
/// cause (unknown symbol, bad pointer, type mismatch, ...) is the source.
pub fn evaluate(expr: &Expr, ctx: &mut EvalContext<'_>) -> Result<TypedValue> {
    eval_inner(expr, ctx).map_err(Error::into_eval)
}

fn eval_inner(expr: &Expr, ctx: &mut EvalContext<'_>) -> Result<TypedValue> {
    match expr {
        Expr::Register(reg) => Ok(TypedValue {
            place: Place::Immediate(i64::from(ctx.registers.get(*reg))),
            type_id: ctx.types.int_type(),
        }),

        Expr::Symbol(name) => eval_symbol(name, ctx),

        Expr::IntConst(v) => Ok(TypedValue {
            place: Place::Immediate(*v),
            type_id: ctx.types.int_type(),
        }),

        Expr::UIntConst(v) => Ok(TypedValue {
            place: Place::Immediate(*v as i64),
            type_id: ctx.types.uint_type(),
        }),

        Expr::StringConst(text) => Ok(TypedValue {
            place: Place::Str(text.clone()),
            type_id: ctx.types.string_type(),
        }),

        Expr::SegAddr { segment, offset } => {
            let seg = eval_inner(segment, ctx)?;
            let off = eval_inner(offset, ctx)?;
            let seg = load(ctx, &seg)? as u32;
            let off = load(ctx, &off)? as u32;
            Ok(TypedValue {
                place: Place::Memory(Address::new(seg, off)),
                type_id: ctx.types.int_type(),
            })
        }

        Expr::Binary { op, lhs, rhs } => {
            let left = eval_inner(lhs, ctx)?;
            let right = eval_inner(rhs, ctx)?;
            eval_binary(*op, &left, &right, ctx)
        }

        Expr::Unary { op, operand } => {
            let value = eval_inner(operand, ctx)?;
            eval_unary(*op, &value, ctx)
        }

        Expr::Field {
            base,
            name,
            via_pointer,
        } => {
            let value = eval_inner(base, ctx)?;
            let (addr, type_id) = if *via_pointer {
                pointee_of(&value, ctx)?
            } else {
                (value.address()?, value.type_id)
            };
            let (field_addr, field_type) =
                ctx.types.find_struct_element(&addr, type_id, name)?;
            Ok(TypedValue {
                place: Place::Memory(field_addr),
                type_id: field_type,
            })
        }

        Expr::Index { base, index } => {
            let value = eval_inner(base, ctx)?;
            let idx = eval_inner(index, ctx)?;
            let idx = load(ctx, &idx)?;
            match ctx.types.kind(ctx.types.strip(value.type_id)) {
                TypeKind::Array { .. } => {
                    let (addr, elem) = ctx.types.array_index(&value.address()?, value.type_id, idx)?;
                    Ok(TypedValue {
                        place: Place::Memory(addr),
                        type_id: elem,
                    })
                }
                TypeKind::Pointer { .. } => {
                    let (addr, elem) = pointee_of(&value, ctx)?;
                    let delta = idx.wrapping_mul(i64::from(ctx.types.object_size(elem))) as u32;
                    Ok(TypedValue {
                        place: Place::Memory(addr.advanced(delta)),
                        type_id: elem,
                    })
                }
                _ => Err(Error::NotAPointer),
            }
        }

        Expr::Call { name, args } => eval_call(name, args, ctx),

        Expr::Cast { type_id, operand } => {
            let value = eval_inner(operand, ctx)?;
            Ok(TypedValue {
                place: value.place,
                type_id: *type_id,
            })
        }
    }
}

fn eval_symbol(name: &str, ctx: &mut EvalContext<'_>) -> Result<TypedValue> {
    if let (Some(func), Some(pc_offset)) = (ctx.current_function, ctx.pc_offset) {
        if let Some(local) = ctx.symbols.find_local(func, name, pc_offset) {
            let type_id = local.type_id.unwrap_or_else(|| ctx.types.int_type());
            return Ok(match local.location {
                LocalLocation::Stack(offset) => TypedValue {
                    place: Place::Memory(Address::new(
                        ctx.stack_segment(),
                        ctx.frame_base.wrapping_add_signed(offset),
                    )),
                    type_id,
                },
                LocalLocation::Register(reg) => TypedValue {
                    place: Place::Immediate(i64::from(ctx.registers.get(reg))),
                    type_id,
                },
            });
        }
    }

    let addr = ctx
        .symbols
        .get_symbol_value(name, ctx.line)
        .ok_or_else(|| Error::UnknownSymbol(name.to_string()))?;
    let type_id = ctx
        .symbols
        .lookup_symbol(name)
        .and_then(|id| ctx.symbols.symbol(id).type_id)
        .unwrap_or_else(|| ctx.types.int_type());
    Ok(TypedValue {
        place: Place::Memory(addr),
        type_id,
    })
}

fn is_pointer(types: &TypeDatabase, id: TypeId) -> bool {
    matches!(types.kind(types.strip(id)), TypeKind::Pointer { .. })
}

/// The address and type behind a pointer-typed value.
///
/// A memory-placed pointer is loaded through the address model, keeping its
/// segment; an immediate pointer (arithmetic result) forms a deferred
/// address resolved against the data segment.
fn pointee_of(value: &TypedValue, ctx: &EvalContext<'_>) -> Result<(Address, TypeId)> {
    match &value.place {
        Place::Memory(addr) => ctx.types.dereference_pointer(
            ctx.space,
            ctx.memory,
            addr,
            value.type_id,
            ctx.data_segment(),
        ),
        Place::Immediate(raw) => {
            let target = ctx
                .types
                .pointer_target(value.type_id)
                .ok_or(Error::NotAPointer)?;
            Ok((Address::deferred(*raw as u32), target))
        }
        Place::Str(_) => Err(Error::NotAPointer),
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &TypedValue,
    right: &TypedValue,
    ctx: &mut EvalContext<'_>,
) -> Result<TypedValue> {
    let left_ptr = is_pointer(ctx.types, left.type_id);
    let right_ptr = is_pointer(ctx.types, right.type_id);

    // Pointer arithmetic first; everything else is integer arithmetic.
    match op {
        BinaryOp::Add if left_ptr && !right_ptr => {
            return pointer_offset(left, load(ctx, right)?, ctx);
        }
        BinaryOp::Add if right_ptr && !left_ptr => {
            return pointer_offset(right, load(ctx, left)?, ctx);
        }
        BinaryOp::Sub if left_ptr && right_ptr => {
            let lt = ctx.types.strip(left.type_id);
            let rt = ctx.types.strip(right.type_id);
            // Interned pointer types: handle equality means same pointee.
            if lt != rt {
                return Err(Error::TypeMismatch(
                    "pointer subtraction with differing pointee types".to_string(),
                ));
            }
            let elem = ctx
                .types
                .pointer_target(left.type_id)
                .ok_or(Error::NotAPointer)?;
            let size = i64::from(ctx.types.object_size(elem)).max(1);
            let count = (load(ctx, left)? - load(ctx, right)?) / size;
            return Ok(TypedValue {
                place: Place::Immediate(count),
                type_id: ctx.types.int_type(),
            });
        }
        BinaryOp::Sub if left_ptr && !right_ptr => {
            return pointer_offset(left, -load(ctx, right)?, ctx);
        }
        _ => {}
    }

    let a = load(ctx, left)?;
    let b = load(ctx, right)?;
    let unsigned = !ctx.types.is_signed(left.type_id) || !ctx.types.is_signed(right.type_id);

    let result = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(Error::DivisionByZero);
            }
            if unsigned {
                ((a as u64) / (b as u64)) as i64
            } else {
                a.wrapping_div(b)
            }
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(Error::DivisionByZero);
            }
            if unsigned {
                ((a as u64) % (b as u64)) as i64
            } else {
                a.wrapping_rem(b)
            }
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b as u32 & 63),
        BinaryOp::Shr => {
            if unsigned {
                ((a as u64).wrapping_shr(b as u32 & 63)) as i64
            } else {
                a.wrapping_shr(b as u32 & 63)
            }
        }
        BinaryOp::Eq => i64::from(a == b),
        BinaryOp::Ne => i64::from(a != b),
        BinaryOp::Lt => i64::from(if unsigned { (a as u64) < (b as u64) } else { a < b }),
        BinaryOp::Gt => i64::from(if unsigned { (a as u64) > (b as u64) } else { a > b }),
        BinaryOp::Le => i64::from(if unsigned { (a as u64) <= (b as u64) } else { a <= b }),
        BinaryOp::Ge => i64::from(if unsigned { (a as u64) >= (b as u64) } else { a >= b }),
        BinaryOp::LogicalAnd => i64::from(a != 0 && b != 0),
        BinaryOp::LogicalOr => i64::from(a != 0 || b != 0),
    };

    let type_id = match op {
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Gt
        | BinaryOp::Le
        | BinaryOp::Ge
        | BinaryOp::LogicalAnd
        | BinaryOp::LogicalOr => ctx.types.int_type(),
        _ if unsigned => ctx.types.uint_type(),
        _ => ctx.types.int_type(),
    };

    Ok(TypedValue {
        place: Place::Immediate(result),
        type_id,
    })
}

/// `pointer + elements`: the result is an rvalue pointer of the same type,
/// advanced by `elements * pointee_size` bytes.
fn pointer_offset(
    pointer: &TypedValue,
    elements: i64,
    ctx: &mut EvalContext<'_>,
) -> Result<TypedValue> {
    let elem = ctx
        .types
        .pointer_target(pointer.type_id)
        .ok_or(Error::NotAPointer)?;
    let size = i64::from(ctx.types.object_size(elem)).max(1);
    let base = load(ctx, pointer)?;
    Ok(TypedValue {
        place: Place::Immediate(base.wrapping_add(elements.wrapping_mul(size))),
        type_id: pointer.type_id,
    })
}

fn eval_unary(op: UnaryOp, value: &TypedValue, ctx: &mut EvalContext<'_>) -> Result<TypedValue> {
    match op {
        UnaryOp::Neg => Ok(TypedValue {
            place: Place::Immediate(load(ctx, value)?.wrapping_neg()),
            type_id: ctx.types.int_type(),
        }),
        UnaryOp::BitNot => Ok(TypedValue {
            place: Place::Immediate(!load(ctx, value)?),
            type_id: ctx.types.int_type(),
        }),
        UnaryOp::LogicalNot => Ok(TypedValue {
            place: Place::Immediate(i64::from(load(ctx, value)? == 0)),
            type_id: ctx.types.int_type(),
        }),
        UnaryOp::Deref => {
            let (addr, type_id) = pointee_of(value, ctx)?;
            Ok(TypedValue {
                place: Place::Memory(addr),
                type_id,
            })
        }
        UnaryOp::AddressOf => {
            let addr = value.address()?;
            let pointer = ctx.types.find_or_make_pointer_type(value.type_id);
            Ok(TypedValue {
                place: Place::Immediate(i64::from(addr.offset)),
                type_id: pointer,
            })
        }
    }
}

fn eval_call(name: &str, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<TypedValue> {
    let mut one_arg = || -> Result<TypedValue> {
        if args.len() != 1 {
            return Err(Error::TypeMismatch(format!(
                "'{name}' takes exactly one argument"
            )));
        }
        eval_inner(&args[0], ctx)
    };

    match name {
        "abs" => {
            let value = one_arg()?;
            let v = load(ctx, &value)?;
            Ok(TypedValue {
                place: Place::Immediate(v.wrapping_abs()),
                type_id: ctx.types.int_type(),
            })
        }
        "seg" => {
            let value = one_arg()?;
            let addr = value.address()?;
            Ok(TypedValue {
                place: Place::Immediate(i64::from(addr.segment)),
                type_id: ctx.types.uint_type(),
            })
        }
        "off" => {
            let value = one_arg()?;
            let addr = value.address()?;
            Ok(TypedValue {
                place: Place::Immediate(i64::from(addr.offset)),
                type_id: ctx.types.uint_type(),
            })
        }
        _ => Err(Error::UnknownFunction(name.to_string())),
    }
}
