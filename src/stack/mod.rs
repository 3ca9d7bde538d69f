//! Call-stack unwinding and frame focus.
//!
//! Unwinding follows the saved frame-pointer chain: each frame's base
//! points at the caller's saved base, with the return address one pointer
//! above it. The chain simply ends, never errors, at a null or unreadable
//! frame pointer, at a base that does not move toward the caller, or at a
//! return address no symbol claims.
//!
//! The navigator also tracks the focus frame: registers and locals in
//! expressions evaluate against the selected frame, so "up two frames,
//! print x" sees the caller's `x`.

use log::trace;

use crate::address::{Address, AddressSpace};
use crate::memory::{self, TargetMemory};
use crate::registers::CpuContext;
use crate::symbols::{SymbolFilter, SymbolId, SymbolTable};

/// Unwind depth cap; a chain longer than this is assumed corrupt.
const MAX_FRAMES: usize = 256;

/// One unwound call frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Function enclosing the frame's pc
    pub symbol: Option<SymbolId>,
    /// pc within the frame: the stop address for frame 0, the return
    /// address for callers
    pub pc: Address,
    /// Frame base (saved frame pointer) of this frame
    pub frame_base: u32,
    /// Register set as seen from this frame; frame 0 carries the live
    /// context, callers a derived one
    pub registers: CpuContext,
}

/// Unwinds the frame-pointer chain from a live register set.
///
/// Frame 0 is the current pc under `cs`. Each further frame reads the
/// saved base at `[frame_base]` and the return address at
/// `[frame_base + 4]`; derived register sets carry the unwound pc, base,
/// and stack pointer so per-frame evaluation stays consistent.
#[must_use]
pub fn unwind(
    space: &AddressSpace,
    mem: &dyn TargetMemory,
    symbols: &SymbolTable,
    context: &CpuContext,
) -> Vec<Frame> {
    let code_filter =
        SymbolFilter::FUNCTION | SymbolFilter::WIN32_EXPORT | SymbolFilter::INTERNAL_RUNTIME;

    let pc = Address::new(context.cs, context.eip);
    let mut frames = vec![Frame {
        symbol: symbols.find_nearest_symbol(&pc, code_filter).map(|(id, _)| id),
        pc,
        frame_base: context.ebp,
        registers: *context,
    }];

    let mut base = context.ebp;
    while frames.len() < MAX_FRAMES {
        if base == 0 {
            break;
        }
        let slot = Address::new(context.ss, base);
        let (saved_base, return_offset) = match (
            memory::read_u32(space, mem, &slot, context.ss),
            memory::read_u32(space, mem, &slot.advanced(4), context.ss),
        ) {
            (Ok(saved), Ok(ret)) => (saved, ret),
            _ => break,
        };
        // The caller's frame sits above ours; a base that fails to grow
        // means the chain is broken or we walked off the stack.
        if saved_base <= base {
            break;
        }
        let return_addr = Address::new(context.cs, return_offset);
        let Some((symbol, _)) = symbols.find_nearest_symbol(&return_addr, code_filter) else {
            break;
        };

        let mut registers = *context;
        registers.eip = return_offset;
        registers.ebp = saved_base;
        registers.esp = base.wrapping_add(8);
        frames.push(Frame {
            symbol: Some(symbol),
            pc: return_addr,
            frame_base: saved_base,
            registers,
        });
        base = saved_base;
    }

    trace!("unwound {} frame(s)", frames.len());
    frames
}

/// The unwound backtrace plus the focus frame selection.
#[derive(Debug, Default)]
pub struct FrameNavigator {
    frames: Vec<Frame>,
    focus: usize,
}

impl FrameNavigator {
    /// Creates an empty navigator with no frames.
    #[must_use]
    pub fn new() -> FrameNavigator {
        FrameNavigator::default()
    }

    /// Replaces the backtrace after a stop; focus returns to frame 0.
    pub fn rebuild(
        &mut self,
        space: &AddressSpace,
        mem: &dyn TargetMemory,
        symbols: &SymbolTable,
        context: &CpuContext,
    ) {
        self.frames = unwind(space, mem, symbols, context);
        self.focus = 0;
    }

    /// The full backtrace, frame 0 first.
    #[must_use]
    pub fn backtrace(&self) -> &[Frame] {
        &self.frames
    }

    /// Selects frame `n` as the evaluation context.
    ///
    /// Returns false, leaving the focus unchanged, when `n` exceeds the
    /// unwound depth.
    pub fn set_frame(&mut self, n: usize) -> bool {
        if n < self.frames.len() {
            self.focus = n;
            true
        } else {
            false
        }
    }

    /// The currently focused frame, if any were unwound.
    #[must_use]
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.get(self.focus)
    }
}
