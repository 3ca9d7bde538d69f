//! Segmented address model for the emulated process.
//!
//! The debugged process lives in a hybrid address space: flat 32-bit system
//! addresses, legacy V86-style `segment:offset` addresses relative to a
//! loaded module, and ordinary selector-relative addresses translated
//! through the emulated descriptor table. This module classifies and
//! resolves all three at runtime, producing plain linear locations the
//! memory layer can validate and access.
//!
//! # Key Components
//!
//! - [`Address`] - A `segment:offset` pair as the debugger passes it around
//! - [`AddressClass`] - The three addressing behaviors, decided per address
//! - [`AddressSpace`] - Descriptor table and module bases; owns resolution
//!
//! # Invariants
//!
//! An [`Address`] whose segment is [`CURRENT_SEGMENT`] must be fixed against
//! a caller-supplied default before use. Once resolved, an address yields a
//! linear location that still has to pass the memory layer's readability or
//! writability check before any byte is touched; an unresolved address is
//! never dereferenced.

use std::collections::HashMap;
use std::fmt;

use crate::{Error, Result};

/// Sentinel segment value meaning "the current default segment".
///
/// Expressions such as `$pc` or a bare offset leave the segment open; the
/// caller supplies the default (usually `cs` for code, `ds` for data) at
/// resolution time.
pub const CURRENT_SEGMENT: u32 = 0xffff_ffff;

/// A segmented address in the debugged process.
///
/// The segment field distinguishes three address classes by bit pattern,
/// see [`AddressSpace::classify`]. Addresses are plain values; resolution
/// and validation happen in [`AddressSpace`] and the memory layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    /// Segment, selector, or [`CURRENT_SEGMENT`]
    pub segment: u32,
    /// Offset within the segment
    pub offset: u32,
}

impl Address {
    /// Creates an address from an explicit segment and offset.
    #[must_use]
    pub fn new(segment: u32, offset: u32) -> Address {
        Address { segment, offset }
    }

    /// Creates a flat (system) address; the offset is the linear location.
    #[must_use]
    pub fn flat(offset: u32) -> Address {
        Address { segment: 0, offset }
    }

    /// Creates an address against the current default segment.
    ///
    /// The segment is the [`CURRENT_SEGMENT`] sentinel and must be fixed
    /// before the address is resolved.
    #[must_use]
    pub fn deferred(offset: u32) -> Address {
        Address {
            segment: CURRENT_SEGMENT,
            offset,
        }
    }

    /// Returns true if the segment is the [`CURRENT_SEGMENT`] sentinel.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        self.segment == CURRENT_SEGMENT
    }

    /// Replaces the [`CURRENT_SEGMENT`] sentinel with the given default.
    ///
    /// Addresses with an explicit segment are returned unchanged.
    #[must_use]
    pub fn fixed(&self, default_segment: u32) -> Address {
        if self.is_deferred() {
            Address::new(default_segment, self.offset)
        } else {
            *self
        }
    }

    /// Returns a copy advanced by `delta` bytes within the same segment.
    #[must_use]
    pub fn advanced(&self, delta: u32) -> Address {
        Address::new(self.segment, self.offset.wrapping_add(delta))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segment == 0 {
            write!(f, "{:#010x}", self.offset)
        } else if self.is_deferred() {
            write!(f, "{:#010x}", self.offset)
        } else {
            write!(f, "{:#06x}:{:#010x}", self.segment, self.offset)
        }
    }
}

/// The three addressing behaviors of the hybrid address space.
///
/// The class is decided at runtime from the segment bit pattern and the
/// descriptor table, not at compile time; the same engine serves flat-model
/// and legacy segmented targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    /// The offset is directly usable as a linear location.
    Flat,
    /// V86-style address: module base + `(segment & 0xFFFF) << 4` + offset.
    SegmentedLegacy,
    /// Translated through the emulated descriptor table.
    SelectorRelative,
}

/// One entry of the emulated descriptor table.
#[derive(Debug, Clone, Copy)]
pub struct SelectorEntry {
    /// Linear base of the segment
    pub base: u32,
    /// Highest valid offset within the segment
    pub limit: u32,
    /// System selectors address the flat linear space directly
    pub system: bool,
}

/// Descriptor table and legacy module bases for one debug session.
///
/// Configured once at attach time from the emulated runtime's descriptor
/// state; the engine consults it for every address it touches.
///
/// # Examples
///
/// ```rust
/// use winscope::address::{Address, AddressSpace};
///
/// let mut space = AddressSpace::new();
/// space.define_selector(0x008f, 0x0010_0000, 0xffff, false);
///
/// let linear = space.resolve(&Address::new(0x008f, 0x42), 0)?;
/// assert_eq!(linear, 0x0010_0042);
/// # Ok::<(), winscope::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct AddressSpace {
    selectors: HashMap<u32, SelectorEntry>,
    module_bases: HashMap<u16, u32>,
}

impl AddressSpace {
    /// Creates an empty address space; only flat addresses resolve until
    /// selectors and module bases are defined.
    #[must_use]
    pub fn new() -> AddressSpace {
        AddressSpace::default()
    }

    /// Defines or replaces a descriptor table entry.
    pub fn define_selector(&mut self, selector: u32, base: u32, limit: u32, system: bool) {
        self.selectors
            .insert(selector, SelectorEntry { base, limit, system });
    }

    /// Records the linear base of a legacy module, addressed by the high
    /// half of a V86-style segment value.
    pub fn define_module_base(&mut self, module: u16, base: u32) {
        self.module_bases.insert(module, base);
    }

    /// Classifies a segment value into its addressing behavior.
    ///
    /// Segment zero and system selectors are flat. A non-zero high half
    /// marks a V86-style legacy address. Everything else goes through the
    /// descriptor table.
    #[must_use]
    pub fn classify(&self, segment: u32) -> AddressClass {
        if segment == 0 {
            return AddressClass::Flat;
        }
        if segment >> 16 != 0 && segment != CURRENT_SEGMENT {
            return AddressClass::SegmentedLegacy;
        }
        match self.selectors.get(&segment) {
            Some(entry) if entry.system => AddressClass::Flat,
            _ => AddressClass::SelectorRelative,
        }
    }

    /// Resolves an address to a linear location.
    ///
    /// The [`CURRENT_SEGMENT`] sentinel is fixed against `default_segment`
    /// first. Resolution is idempotent for flat addresses: resolving an
    /// already-resolved linear location yields the same location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSelector`] if the segment translates through
    /// the descriptor table but no entry exists, if the offset exceeds the
    /// descriptor limit, or if a legacy segment names an unknown module.
    pub fn resolve(&self, addr: &Address, default_segment: u32) -> Result<u32> {
        let fixed = addr.fixed(default_segment);
        match self.classify(fixed.segment) {
            AddressClass::Flat => Ok(fixed.offset),
            AddressClass::SegmentedLegacy => {
                let module = (fixed.segment >> 16) as u16;
                let base = self
                    .module_bases
                    .get(&module)
                    .ok_or(Error::InvalidSelector {
                        selector: fixed.segment,
                    })?;
                Ok(base
                    .wrapping_add((fixed.segment & 0xffff) << 4)
                    .wrapping_add(fixed.offset))
            }
            AddressClass::SelectorRelative => {
                let entry = self
                    .selectors
                    .get(&fixed.segment)
                    .ok_or(Error::InvalidSelector {
                        selector: fixed.segment,
                    })?;
                if fixed.offset > entry.limit {
                    return Err(Error::InvalidSelector {
                        selector: fixed.segment,
                    });
                }
                Ok(entry.base.wrapping_add(fixed.offset))
            }
        }
    }
}
