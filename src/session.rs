//! The debug session: the one object tying every engine component to one
//! debugged target.
//!
//! A [`DebugSession`] is constructed at attach time and dropped at detach;
//! there is no global debugger state. All component state (address space,
//! symbols, types, breakpoints, execution mode, frames) lives in the
//! session, every operation takes it explicitly, and everything runs on the
//! single thread that receives trap notifications. Operations are
//! synchronous request/response against stopped-process state.
//!
//! The session's job on a trap is orchestration: feed it to the execution
//! controller, and on a halt rebuild the backtrace, resolve the stop
//! location to a function and line, and refresh the watch displays.

use log::info;

use crate::address::{Address, AddressSpace};
use crate::breakpoints::BreakpointManager;
use crate::display::{DisplayManager, DisplayReport};
use crate::exec::{ExecMode, ExecutionControl, Resumption, StopReport, TrapDecision, TrapEvent};
use crate::expr::{self, EvalContext, Expr, TypedValue};
use crate::memory::TargetMemory;
use crate::registers::CpuContext;
use crate::stack::{Frame, FrameNavigator};
use crate::symbols::{SymbolFilter, SymbolId, SymbolTable};
use crate::types::TypeDatabase;
use crate::Result;

/// A halt, resolved and reported for the user.
#[derive(Debug)]
pub struct StopEvent {
    /// Where execution stopped
    pub addr: Address,
    /// Name of the enclosing function, when a symbol claims the address
    pub function: Option<String>,
    /// Source line at the stop, when line information covers it
    pub line: Option<u32>,
    /// The controller's raw stop report (breakpoint id, condition error)
    pub report: StopReport,
    /// Watch displays, re-evaluated at this stop
    pub displays: Vec<DisplayReport>,
}

/// The session-level outcome of one trap.
#[derive(Debug)]
pub enum TrapOutcome {
    /// Execution halted; the user has control
    Stopped(StopEvent),
    /// Execution resumes as instructed
    Resumed(Resumption),
}

/// One attached debug target and all engine state for it.
///
/// Component managers are public: debug-info ingestion populates
/// [`symbols`](DebugSession::symbols) and [`types`](DebugSession::types)
/// directly, the command front end drives
/// [`breakpoints`](DebugSession::breakpoints) and
/// [`displays`](DebugSession::displays). The session methods cover the
/// orchestration the components cannot do alone.
pub struct DebugSession {
    /// Selector table and legacy module bases
    pub space: AddressSpace,
    /// The target's memory accessor
    pub memory: Box<dyn TargetMemory>,
    /// Type database
    pub types: TypeDatabase,
    /// Symbol table
    pub symbols: SymbolTable,
    /// Breakpoint set
    pub breakpoints: BreakpointManager,
    /// Execution-control state machine
    pub exec: ExecutionControl,
    /// Watch displays
    pub displays: DisplayManager,
    frames: FrameNavigator,
    context: CpuContext,
}

const CODE_FILTER: SymbolFilter = SymbolFilter::FUNCTION
    .union(SymbolFilter::WIN32_EXPORT)
    .union(SymbolFilter::INTERNAL_RUNTIME);

impl DebugSession {
    /// Attaches to a target reachable through the given memory accessor.
    #[must_use]
    pub fn new(memory: Box<dyn TargetMemory>) -> DebugSession {
        DebugSession {
            space: AddressSpace::new(),
            memory,
            types: TypeDatabase::new(),
            symbols: SymbolTable::new(),
            breakpoints: BreakpointManager::new(),
            exec: ExecutionControl::new(),
            displays: DisplayManager::new(),
            frames: FrameNavigator::new(),
            context: CpuContext::default(),
        }
    }

    /// The register snapshot of the last trap.
    #[must_use]
    pub fn context(&self) -> &CpuContext {
        &self.context
    }

    /// The enclosing function, pc offset within it, and source line at an
    /// address.
    fn scope_at(symbols: &SymbolTable, addr: &Address) -> (Option<SymbolId>, Option<u32>, Option<u32>) {
        let Some((id, sym)) = symbols.find_nearest_symbol(addr, CODE_FILTER) else {
            return (None, None, None);
        };
        let pc_offset = addr.offset.wrapping_sub(sym.addr.offset);
        let line = symbols.nearest_line(id, addr.offset);
        (Some(id), Some(pc_offset), line)
    }

    /// Handles one trap from the emulated runtime.
    ///
    /// On a halt the backtrace is rebuilt (focus returns to frame 0), the
    /// stop location is resolved to a function and line, and every watch
    /// display is re-evaluated. On a resume nothing else is touched; the
    /// target keeps running.
    pub fn handle_trap(&mut self, trap: &TrapEvent) -> TrapOutcome {
        self.context = trap.context;

        let (current_function, pc_offset, line) = Self::scope_at(&self.symbols, &trap.addr);
        let mut ctx = EvalContext {
            types: &mut self.types,
            symbols: &self.symbols,
            space: &self.space,
            memory: self.memory.as_ref(),
            registers: trap.context,
            current_function,
            pc_offset,
            line,
            frame_base: trap.context.ebp,
        };

        let report = match self.exec.handle_trap(trap, &mut self.breakpoints, &mut ctx) {
            TrapDecision::Resume(resume) => return TrapOutcome::Resumed(resume),
            TrapDecision::Halt(report) => report,
        };
        drop(ctx);

        self.frames
            .rebuild(&self.space, self.memory.as_ref(), &self.symbols, &trap.context);

        let function = current_function.map(|id| self.symbols.symbol(id).name.clone());
        info!(
            "stopped at {} in {}{}",
            trap.addr,
            function.as_deref().unwrap_or("??"),
            line.map(|l| format!(", line {l}")).unwrap_or_default()
        );

        let mut ctx = EvalContext {
            types: &mut self.types,
            symbols: &self.symbols,
            space: &self.space,
            memory: self.memory.as_ref(),
            registers: trap.context,
            current_function,
            pc_offset,
            line,
            frame_base: trap.context.ebp,
        };
        let displays = self.displays.refresh(&mut ctx);

        TrapOutcome::Stopped(StopEvent {
            addr: trap.addr,
            function,
            line,
            report,
            displays,
        })
    }

    /// Arms an execution mode and returns the resume instructions.
    ///
    /// The mode-entry line and frame base come from the state the target
    /// is currently stopped in.
    pub fn restart(&mut self, mode: ExecMode, count: u32) -> Resumption {
        let pc = Address::new(self.context.cs, self.context.eip);
        self.exec
            .restart_execution(mode, count, &pc, self.context.ebp, &self.symbols)
    }

    /// Evaluates an expression against the focus frame.
    ///
    /// Registers, locals, and the frame base all come from the selected
    /// frame, so after `set_frame(1)` an evaluation sees the caller's
    /// state.
    ///
    /// # Errors
    ///
    /// Any evaluation failure, wrapped as [`Error::Eval`](crate::Error::Eval).
    pub fn evaluate(&mut self, expr: &Expr) -> Result<TypedValue> {
        let (registers, frame_base, pc) = match self.frames.current_frame() {
            Some(frame) => (frame.registers, frame.frame_base, frame.pc),
            None => (
                self.context,
                self.context.ebp,
                Address::new(self.context.cs, self.context.eip),
            ),
        };
        let (current_function, pc_offset, line) = Self::scope_at(&self.symbols, &pc);
        let mut ctx = EvalContext {
            types: &mut self.types,
            symbols: &self.symbols,
            space: &self.space,
            memory: self.memory.as_ref(),
            registers,
            current_function,
            pc_offset,
            line,
            frame_base,
        };
        expr::evaluate(expr, &mut ctx)
    }

    /// Evaluates an expression and loads its scalar value.
    ///
    /// # Errors
    ///
    /// Any evaluation or memory-read failure.
    pub fn evaluate_scalar(&mut self, expr: &Expr) -> Result<i64> {
        let (registers, frame_base, pc) = match self.frames.current_frame() {
            Some(frame) => (frame.registers, frame.frame_base, frame.pc),
            None => (
                self.context,
                self.context.ebp,
                Address::new(self.context.cs, self.context.eip),
            ),
        };
        let (current_function, pc_offset, line) = Self::scope_at(&self.symbols, &pc);
        let mut ctx = EvalContext {
            types: &mut self.types,
            symbols: &self.symbols,
            space: &self.space,
            memory: self.memory.as_ref(),
            registers,
            current_function,
            pc_offset,
            line,
            frame_base,
        };
        let value = expr::evaluate(expr, &mut ctx)?;
        expr::load(&ctx, &value)
    }

    /// The backtrace of the last stop, frame 0 first.
    #[must_use]
    pub fn backtrace(&self) -> &[Frame] {
        self.frames.backtrace()
    }

    /// Selects frame `n` for subsequent evaluation. Returns false if `n`
    /// exceeds the unwound depth.
    pub fn set_frame(&mut self, n: usize) -> bool {
        self.frames.set_frame(n)
    }

    /// The focused frame of the last stop.
    #[must_use]
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.current_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayFormat;
    use crate::memory::{self, BufferMemory};
    use crate::symbols::{LocalLocation, SymbolAttrs, SymbolKind};

    fn session() -> DebugSession {
        DebugSession::new(Box::new(BufferMemory::new(0, 0x10000)))
    }

    fn trap(offset: u32, ebp: u32) -> TrapEvent {
        TrapEvent {
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

    #[test]
    fn breakpoint_stop_reports_function_and_line() {
        let mut session = session();
        let foo = session.symbols.add_symbol(
            "foo",
            Address::flat(0x1000),
            Some("foo.c"),
            SymbolKind::Function,
            SymbolAttrs::default(),
        );
        session.symbols.add_line_number(foo, 5, 0x1000);
        session.symbols.add_line_number(foo, 6, 0x1008);
        session.breakpoints.add(Address::flat(0x1008));

        let resume = session.restart(ExecMode::Continue, 1);
        assert!(!resume.single_step);

        // Free-running past an address without a breakpoint.
        let outcome = session.handle_trap(&trap(0x1004, 0x2000));
        assert!(matches!(outcome, TrapOutcome::Resumed(_)));

        let outcome = session.handle_trap(&trap(0x1008, 0x2000));
        match outcome {
            TrapOutcome::Stopped(stop) => {
                assert_eq!(stop.addr, Address::flat(0x1008));
                assert_eq!(stop.function.as_deref(), Some("foo"));
                assert_eq!(stop.line, Some(6));
                assert!(stop.report.breakpoint.is_some());
            }
            TrapOutcome::Resumed(_) => panic!("expected a stop"),
        }
    }

    #[test]
    fn displays_refresh_on_stop() {
        let mut session = session();
        let int_ty = session.types.int_type();
        let sym = session.symbols.add_symbol(
            "counter",
            Address::flat(0x4000),
            None,
            SymbolKind::Data,
            SymbolAttrs::default(),
        );
        session.symbols.set_symbol_type(sym, int_ty);
        memory::write_bytes(
            &session.space,
            session.memory.as_mut(),
            &Address::flat(0x4000),
            0,
            &13i32.to_le_bytes(),
        )
        .unwrap();

        let id = session
            .displays
            .add(Expr::Symbol("counter".to_string()), DisplayFormat::Decimal);
        session.breakpoints.add(Address::flat(0x1000));

        let outcome = session.handle_trap(&trap(0x1000, 0x2000));
        match outcome {
            TrapOutcome::Stopped(stop) => {
                assert_eq!(stop.displays.len(), 1);
                assert_eq!(stop.displays[0].id, id);
                assert_eq!(stop.displays[0].value.as_deref().unwrap(), "13");
            }
            TrapOutcome::Resumed(_) => panic!("expected a stop"),
        }
    }

    #[test]
    fn frame_selection_switches_evaluation_scope() {
        let mut session = session();
        let int_ty = session.types.int_type();

        let main = session.symbols.add_symbol(
            "main",
            Address::flat(0x100),
            Some("main.c"),
            SymbolKind::Function,
            SymbolAttrs::default(),
        );
        let helper = session.symbols.add_symbol(
            "helper",
            Address::flat(0x300),
            Some("main.c"),
            SymbolKind::Function,
            SymbolAttrs::default(),
        );
        // Both functions declare a stack local `n` at base-4.
        let main_n = session
            .symbols
            .add_local(main, LocalLocation::Stack(-4), 0, 0x100, "n");
        session.symbols.set_local_type(main_n, int_ty);
        let helper_n = session
            .symbols
            .add_local(helper, LocalLocation::Stack(-4), 0, 0x100, "n");
        session.symbols.set_local_type(helper_n, int_ty);

        // helper's frame at 0x1f00 (n = 7), main's at 0x2000 (n = 42).
        let writes: [(u32, u32); 4] = [
            (0x1f00 - 4, 7),
            (0x2000 - 4, 42),
            (0x1f00, 0x2000), // saved ebp
            (0x1f04, 0x115),  // return address into main
        ];
        for (at, value) in writes {
            memory::write_bytes(
                &session.space,
                session.memory.as_mut(),
                &Address::flat(at),
                0,
                &value.to_le_bytes(),
            )
            .unwrap();
        }
        memory::write_bytes(
            &session.space,
            session.memory.as_mut(),
            &Address::flat(0x2000),
            0,
            &0u32.to_le_bytes(),
        )
        .unwrap();

        session.breakpoints.add(Address::flat(0x308));
        let outcome = session.handle_trap(&trap(0x308, 0x1f00));
        assert!(matches!(outcome, TrapOutcome::Stopped(_)));
        assert_eq!(session.backtrace().len(), 2);

        let n = Expr::Symbol("n".to_string());
        assert_eq!(session.evaluate_scalar(&n).unwrap(), 7);

        assert!(session.set_frame(1));
        assert_eq!(session.evaluate_scalar(&n).unwrap(), 42);

        assert!(!session.set_frame(5));
    }

    #[test]
    fn step_over_in_the_canned_program_lands_on_line_11() {
        use crate::test::{layout, session_with_program, symbol_named, trap_at};

        let mut session = session_with_program();
        let entry = session.breakpoints.add(Address::flat(layout::MAIN));
        let outcome = session.handle_trap(&trap_at(layout::MAIN, layout::MAIN_FRAME));
        assert!(matches!(outcome, TrapOutcome::Stopped(_)));
        assert!(session.breakpoints.delete(entry));

        let resume = session.restart(ExecMode::StepOverSource, 1);
        assert!(resume.single_step);

        // Still on line 10 at 0x104, the step keeps going.
        let outcome = session.handle_trap(&trap_at(0x104, layout::MAIN_FRAME));
        assert!(matches!(outcome, TrapOutcome::Resumed(r) if r.single_step));

        let outcome = session.handle_trap(&trap_at(0x110, layout::MAIN_FRAME));
        match outcome {
            TrapOutcome::Stopped(event) => {
                assert_eq!(event.function.as_deref(), Some("main"));
                assert_eq!(event.line, Some(11));
            }
            TrapOutcome::Resumed(_) => panic!("step should satisfy on the next line"),
        }

        let main = symbol_named(&session, "main");
        let line_11 = session.symbols.get_line_number_address(main, 11, true).unwrap();
        assert_eq!(line_11, Address::flat(0x110));
    }
}
