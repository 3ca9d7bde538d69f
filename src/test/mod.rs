//! Shared fixtures for unit tests: a small emulated target with a known
//! program layout.

use crate::address::Address;
use crate::memory::{self, BufferMemory};
use crate::registers::CpuContext;
use crate::session::DebugSession;
use crate::symbols::{LocalLocation, SymbolAttrs, SymbolId, SymbolKind};

/// Layout constants of the canned target program.
pub mod layout {
    /// Entry of `main`
    pub const MAIN: u32 = 0x100;
    /// Entry of `helper`, called from `main`
    pub const HELPER: u32 = 0x300;
    /// `main`'s frame base
    pub const MAIN_FRAME: u32 = 0x2000;
    /// `helper`'s frame base
    pub const HELPER_FRAME: u32 = 0x1f00;
    /// Return address from `helper` back into `main`
    pub const RETURN_TO_MAIN: u32 = 0x115;
}

/// A session attached to a 64 KiB flat target holding two functions:
/// `main` (lines 10/11/12 at 0x100/0x110/0x120, local `n` at base-4) and
/// `helper` (line 40 at 0x300). The stack is staged as if `main` had
/// called `helper`.
pub fn session_with_program() -> DebugSession {
    let mut session = DebugSession::new(Box::new(BufferMemory::new(0, 0x10000)));

    let main = session.symbols.add_symbol(
        "main",
        Address::flat(layout::MAIN),
        Some("main.c"),
        SymbolKind::Function,
        SymbolAttrs::default(),
    );
    session.symbols.add_line_number(main, 10, 0x100);
    session.symbols.add_line_number(main, 11, 0x110);
    session.symbols.add_line_number(main, 12, 0x120);
    let int_ty = session.types.int_type();
    let n = session
        .symbols
        .add_local(main, LocalLocation::Stack(-4), 0, 0x100, "n");
    session.symbols.set_local_type(n, int_ty);

    let helper = session.symbols.add_symbol(
        "helper",
        Address::flat(layout::HELPER),
        Some("main.c"),
        SymbolKind::Function,
        SymbolAttrs::default(),
    );
    session.symbols.add_line_number(helper, 40, 0x300);

    stage_call_stack(&mut session);
    session
}

/// Writes `main -> helper` frame linkage into target memory.
pub fn stage_call_stack(session: &mut DebugSession) {
    let writes: [(u32, u32); 3] = [
        (layout::HELPER_FRAME, layout::MAIN_FRAME),
        (layout::HELPER_FRAME + 4, layout::RETURN_TO_MAIN),
        (layout::MAIN_FRAME, 0),
    ];
    for (at, value) in writes {
        memory::write_scalar(
            &session.space,
            session.memory.as_mut(),
            &Address::flat(at),
            0,
            u64::from(value),
            4,
        )
        .expect("staged write within the mapped target");
    }
}

/// A trap event at `offset` with the given frame base.
pub fn trap_at(offset: u32, ebp: u32) -> crate::exec::TrapEvent {
    crate::exec::TrapEvent {
        addr: Address::flat(offset),
        context: CpuContext {
            eip: offset,
            ebp,
            esp: ebp,
            ..CpuContext::default()
        },
        exception: None,
    }
}

/// The symbol id registered for a name, panicking when absent.
pub fn symbol_named(session: &DebugSession, name: &str) -> SymbolId {
    session
        .symbols
        .lookup_symbol(name)
        .expect("fixture symbol present")
}
