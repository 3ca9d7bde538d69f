//! Register identifiers and register-set snapshots.
//!
//! The trap source hands the engine a [`CpuContext`] snapshot with every
//! trap; the stack navigator derives per-frame register sets from it, and
//! the expression engine reads registers from whichever frame currently has
//! focus. The [`Register`] names round-trip through strings so the command
//! front end can map user text like `$eax` straight onto the enum.

use strum::{Display, EnumString};

/// A register of the emulated i386 CPU, as named in debugger expressions.
///
/// The 16-bit aliases read the low half of their 32-bit counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Register {
    /// Accumulator
    Eax,
    /// Base
    Ebx,
    /// Count
    Ecx,
    /// Data
    Edx,
    /// Source index
    Esi,
    /// Destination index
    Edi,
    /// Frame base
    Ebp,
    /// Flags
    Efl,
    /// Instruction pointer
    Eip,
    /// Stack pointer
    Esp,
    /// Low half of eax
    Ax,
    /// Low half of ebx
    Bx,
    /// Low half of ecx
    Cx,
    /// Low half of edx
    Dx,
    /// Low half of esi
    Si,
    /// Low half of edi
    Di,
    /// Low half of ebp
    Bp,
    /// Low half of the flags
    Fl,
    /// Low half of the instruction pointer
    Ip,
    /// Low half of the stack pointer
    Sp,
    /// Code segment
    Cs,
    /// Data segment
    Ds,
    /// Extra segment
    Es,
    /// Stack segment
    Ss,
    /// General-purpose segment
    Fs,
    /// General-purpose segment
    Gs,
}

/// Trap-flag bit in `eflags`; set to request single-step traps.
pub const STEP_FLAG: u32 = 0x100;

/// One snapshot of the emulated CPU's register state.
///
/// Frame 0 uses the live snapshot delivered with the trap; outer frames
/// carry copies with `eip`, `ebp`, and `esp` rewound by the unwinder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuContext {
    /// General-purpose registers
    pub eax: u32,
    /// General-purpose registers
    pub ebx: u32,
    /// General-purpose registers
    pub ecx: u32,
    /// General-purpose registers
    pub edx: u32,
    /// Source index
    pub esi: u32,
    /// Destination index
    pub edi: u32,
    /// Frame base pointer
    pub ebp: u32,
    /// Stack pointer
    pub esp: u32,
    /// Instruction pointer
    pub eip: u32,
    /// Flags
    pub eflags: u32,
    /// Code segment
    pub cs: u32,
    /// Data segment
    pub ds: u32,
    /// Extra segment
    pub es: u32,
    /// Stack segment
    pub ss: u32,
    /// General-purpose segment
    pub fs: u32,
    /// General-purpose segment
    pub gs: u32,
}

impl CpuContext {
    /// Reads a register; 16-bit aliases return the low half.
    #[must_use]
    pub fn get(&self, reg: Register) -> u32 {
        match reg {
            Register::Eax => self.eax,
            Register::Ebx => self.ebx,
            Register::Ecx => self.ecx,
            Register::Edx => self.edx,
            Register::Esi => self.esi,
            Register::Edi => self.edi,
            Register::Ebp => self.ebp,
            Register::Efl => self.eflags,
            Register::Eip => self.eip,
            Register::Esp => self.esp,
            Register::Ax => self.eax & 0xffff,
            Register::Bx => self.ebx & 0xffff,
            Register::Cx => self.ecx & 0xffff,
            Register::Dx => self.edx & 0xffff,
            Register::Si => self.esi & 0xffff,
            Register::Di => self.edi & 0xffff,
            Register::Bp => self.ebp & 0xffff,
            Register::Fl => self.eflags & 0xffff,
            Register::Ip => self.eip & 0xffff,
            Register::Sp => self.esp & 0xffff,
            Register::Cs => self.cs,
            Register::Ds => self.ds,
            Register::Es => self.es,
            Register::Ss => self.ss,
            Register::Fs => self.fs,
            Register::Gs => self.gs,
        }
    }

    /// Sets a register; 16-bit aliases replace the low half only.
    pub fn set(&mut self, reg: Register, value: u32) {
        let set_low = |slot: &mut u32| *slot = (*slot & 0xffff_0000) | (value & 0xffff);
        match reg {
            Register::Eax => self.eax = value,
            Register::Ebx => self.ebx = value,
            Register::Ecx => self.ecx = value,
            Register::Edx => self.edx = value,
            Register::Esi => self.esi = value,
            Register::Edi => self.edi = value,
            Register::Ebp => self.ebp = value,
            Register::Efl => self.eflags = value,
            Register::Eip => self.eip = value,
            Register::Esp => self.esp = value,
            Register::Ax => set_low(&mut self.eax),
            Register::Bx => set_low(&mut self.ebx),
            Register::Cx => set_low(&mut self.ecx),
            Register::Dx => set_low(&mut self.edx),
            Register::Si => set_low(&mut self.esi),
            Register::Di => set_low(&mut self.edi),
            Register::Bp => set_low(&mut self.ebp),
            Register::Fl => set_low(&mut self.eflags),
            Register::Ip => set_low(&mut self.eip),
            Register::Sp => set_low(&mut self.esp),
            Register::Cs => self.cs = value,
            Register::Ds => self.ds = value,
            Register::Es => self.es = value,
            Register::Ss => self.ss = value,
            Register::Fs => self.fs = value,
            Register::Gs => self.gs = value,
        }
    }
}
