//! Validated access to the debugged process's memory.
//!
//! The actual byte-level transport into the emulated process is an external
//! collaborator behind the [`TargetMemory`] trait. Everything the engine
//! reads or writes goes through the checked helpers here: the address is
//! resolved by the [`AddressSpace`](crate::address::AddressSpace), the
//! location is validated against the target's memory map for the required
//! byte count, and only then is the access attempted. A failed check
//! surfaces [`Error::BadPointer`] with the offending address; it never
//! crashes the debugger itself.
//!
//! Nothing is cached between stops. The target may have run and changed
//! state since the last call, so every evaluation re-reads live memory.

use crate::address::{Address, AddressSpace};
use crate::{Error, Result};

/// Byte-level access to the debugged process's address space.
///
/// Implemented by the emulated runtime (or a test fixture). The engine only
/// calls `read`/`write` on locations that just passed the corresponding
/// validation, but implementations should still fail gracefully on a bad
/// location rather than panic.
pub trait TargetMemory {
    /// Returns true if `len` bytes starting at `linear` may be read.
    fn is_readable(&self, linear: u32, len: u32) -> bool;

    /// Returns true if `len` bytes starting at `linear` may be written.
    fn is_writable(&self, linear: u32, len: u32) -> bool;

    /// Copies bytes out of the target into `buf`.
    ///
    /// # Errors
    ///
    /// Implementations report an unreadable range as [`Error::BadPointer`]
    /// with a flat address.
    fn read(&self, linear: u32, buf: &mut [u8]) -> Result<()>;

    /// Copies bytes from `data` into the target.
    ///
    /// # Errors
    ///
    /// Implementations report an unwritable range as [`Error::BadPointer`]
    /// with a flat address.
    fn write(&mut self, linear: u32, data: &[u8]) -> Result<()>;
}

/// Resolves, validates, and reads `buf.len()` bytes at `addr`.
///
/// # Errors
///
/// Returns [`Error::InvalidSelector`] if the address does not resolve and
/// [`Error::BadPointer`] if the location fails the readability check.
pub fn read_bytes(
    space: &AddressSpace,
    memory: &dyn TargetMemory,
    addr: &Address,
    default_segment: u32,
    buf: &mut [u8],
) -> Result<()> {
    let linear = space.resolve(addr, default_segment)?;
    let len = buf.len() as u32;
    if !memory.is_readable(linear, len) {
        return Err(Error::BadPointer {
            addr: addr.fixed(default_segment),
            len,
        });
    }
    memory.read(linear, buf)
}

/// Resolves, validates, and writes `data` at `addr`.
///
/// # Errors
///
/// Returns [`Error::InvalidSelector`] if the address does not resolve and
/// [`Error::BadPointer`] if the location fails the writability check.
pub fn write_bytes(
    space: &AddressSpace,
    memory: &mut dyn TargetMemory,
    addr: &Address,
    default_segment: u32,
    data: &[u8],
) -> Result<()> {
    let linear = space.resolve(addr, default_segment)?;
    let len = data.len() as u32;
    if !memory.is_writable(linear, len) {
        return Err(Error::BadPointer {
            addr: addr.fixed(default_segment),
            len,
        });
    }
    memory.write(linear, data)
}

/// Reads a little-endian scalar of 1, 2, or 4 bytes, zero-extended.
///
/// Larger or odd sizes read the low 4 bytes; the callers clamp sizes from
/// [`object_size`](crate::types::TypeDatabase::object_size) before use.
///
/// # Errors
///
/// Propagates resolution and validation failures from [`read_bytes`].
pub fn read_scalar(
    space: &AddressSpace,
    memory: &dyn TargetMemory,
    addr: &Address,
    default_segment: u32,
    size: u32,
) -> Result<u64> {
    let size = match size {
        1 | 2 | 4 => size,
        _ => 4,
    };
    let mut buf = [0u8; 4];
    read_bytes(space, memory, addr, default_segment, &mut buf[..size as usize])?;
    Ok(u64::from(u32::from_le_bytes(buf)))
}

/// Reads a little-endian `u32` at `addr`.
///
/// # Errors
///
/// Propagates resolution and validation failures from [`read_bytes`].
pub fn read_u32(
    space: &AddressSpace,
    memory: &dyn TargetMemory,
    addr: &Address,
    default_segment: u32,
) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_bytes(space, memory, addr, default_segment, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Writes a little-endian scalar of 1, 2, or 4 bytes.
///
/// # Errors
///
/// Propagates resolution and validation failures from [`write_bytes`].
pub fn write_scalar(
    space: &AddressSpace,
    memory: &mut dyn TargetMemory,
    addr: &Address,
    default_segment: u32,
    value: u64,
    size: u32,
) -> Result<()> {
    let size = match size {
        1 | 2 | 4 => size,
        _ => 4,
    };
    let bytes = (value as u32).to_le_bytes();
    write_bytes(space, memory, addr, default_segment, &bytes[..size as usize])
}

/// A contiguous block of emulated RAM mapped at a fixed linear base.
///
/// A convenience [`TargetMemory`] for tests and in-process targets whose
/// memory is one flat buffer. Accesses outside the mapped range fail the
/// validation checks.
#[derive(Debug)]
pub struct BufferMemory {
    base: u32,
    data: Vec<u8>,
}

impl BufferMemory {
    /// Maps `size` zeroed bytes at linear address `base`.
    #[must_use]
    pub fn new(base: u32, size: usize) -> BufferMemory {
        BufferMemory {
            base,
            data: vec![0; size],
        }
    }

    fn range(&self, linear: u32, len: u32) -> Option<std::ops::Range<usize>> {
        let start = linear.checked_sub(self.base)? as usize;
        let end = start.checked_add(len as usize)?;
        if end <= self.data.len() {
            Some(start..end)
        } else {
            None
        }
    }
}

impl TargetMemory for BufferMemory {
    fn is_readable(&self, linear: u32, len: u32) -> bool {
        self.range(linear, len).is_some()
    }

    fn is_writable(&self, linear: u32, len: u32) -> bool {
        self.range(linear, len).is_some()
    }

    fn read(&self, linear: u32, buf: &mut [u8]) -> Result<()> {
        match self.range(linear, buf.len() as u32) {
            Some(range) => {
                buf.copy_from_slice(&self.data[range]);
                Ok(())
            }
            None => Err(Error::BadPointer {
                addr: Address::flat(linear),
                len: buf.len() as u32,
            }),
        }
    }

    fn write(&mut self, linear: u32, data: &[u8]) -> Result<()> {
        match self.range(linear, data.len() as u32) {
            Some(range) => {
                self.data[range].copy_from_slice(data);
                Ok(())
            }
            None => Err(Error::BadPointer {
                addr: Address::flat(linear),
                len: data.len() as u32,
            }),
        }
    }
}
