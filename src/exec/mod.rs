//! Execution control: the state machine that turns raw traps into stepping
//! semantics.
//!
//! The emulated runtime delivers every debug trap to
//! [`ExecutionControl::handle_trap`] and receives back a [`TrapDecision`]:
//! halt and hand control to the user, or resume with instructions (single
//! step vs. free run, pass the exception on or swallow it). The controller
//! never drops a trap; every one produces a deterministic decision.
//!
//! # Stepping model
//!
//! Instruction modes halt at every trap. Source modes keep single-stepping
//! while [`check_lineno_status`](crate::symbols::SymbolTable::check_lineno_status)
//! reports [`NotOnLine`](crate::symbols::LineStatus::NotOnLine), and halt on
//! the first instruction of a line different from the one the mode was
//! entered on, subject to the frame-depth rule: on x86 the stack grows
//! down, so a deeper call frame has a smaller frame base. Step-over ignores
//! stops in deeper frames; finish waits for a strictly shallower one.
//!
//! Trampoline stubs would make "the instruction after the call" the wrong
//! resume point, so [`ExecMode::StepOverTrampoline`] reads the real return
//! address off the top of the stack, plants a one-shot breakpoint there,
//! and free-runs until it fires.

use log::{debug, trace};
use strum::Display;

use crate::address::{Address, AddressSpace};
use crate::breakpoints::{BreakpointId, BreakpointManager};
use crate::expr::EvalContext;
use crate::memory::{self, TargetMemory};
use crate::registers::CpuContext;
use crate::symbols::{LineStatus, SymbolTable};
use crate::Error;

/// What the user asked the target to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ExecMode {
    /// Run until the next trap
    Continue,
    /// Run, delivering exceptions to the emulated program instead of
    /// stopping on them
    ContinuePassException,
    /// Run to the next distinct source line in the same or a caller frame
    StepOverSource,
    /// Run to the next distinct source line, entering calls
    StepIntoSource,
    /// Execute one instruction, skipping over calls
    StepOverInstruction,
    /// Execute one instruction, entering calls
    StepIntoInstruction,
    /// Run until the current frame returns
    Finish,
    /// The next instruction calls through a trampoline stub; stop at the
    /// real return address read off the stack
    StepOverTrampoline,
}

impl ExecMode {
    fn is_instruction_step(self) -> bool {
        matches!(
            self,
            ExecMode::StepOverInstruction | ExecMode::StepIntoInstruction
        )
    }

    fn is_source_step(self) -> bool {
        matches!(
            self,
            ExecMode::StepOverSource | ExecMode::StepIntoSource | ExecMode::StepOverTrampoline
        )
    }

    fn skips_deeper_frames(self) -> bool {
        matches!(
            self,
            ExecMode::StepOverSource | ExecMode::StepOverInstruction | ExecMode::StepOverTrampoline
        )
    }
}

/// A debug trap delivered by the emulated CPU.
#[derive(Debug, Clone)]
pub struct TrapEvent {
    /// Faulting/stopping address
    pub addr: Address,
    /// Register snapshot at the trap
    pub context: CpuContext,
    /// Exception record when the trap is a fault rather than a step or
    /// breakpoint
    pub exception: Option<ExceptionRecord>,
}

/// The exception half of a fault trap.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionRecord {
    /// Platform exception code
    pub code: u32,
}

/// Resume instructions for the emulated runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resumption {
    /// Single-step (trap after one instruction) vs. free run
    pub single_step: bool,
    /// Deliver the pending exception to the emulated program
    pub pass_exception: bool,
}

impl Resumption {
    fn free_run() -> Resumption {
        Resumption {
            single_step: false,
            pass_exception: false,
        }
    }

    fn single_step() -> Resumption {
        Resumption {
            single_step: true,
            pass_exception: false,
        }
    }
}

/// Why and where execution halted.
#[derive(Debug)]
pub struct StopReport {
    /// The halt address
    pub addr: Address,
    /// The breakpoint that fired, if the halt came from one
    pub breakpoint: Option<BreakpointId>,
    /// A breakpoint-condition failure reported alongside the stop
    pub condition_error: Option<Error>,
}

/// The controller's verdict for one trap.
#[derive(Debug)]
pub enum TrapDecision {
    /// Hand control to the user
    Halt(StopReport),
    /// Keep the target running as instructed
    Resume(Resumption),
}

/// Looks at the instruction under the pc so step-over can skip calls.
///
/// Purely advisory: when no inspector is wired in, the frame-depth rule
/// alone still yields correct step-over behavior, just by single-stepping
/// through the callee.
pub trait InstructionInspector {
    /// If the instruction at `pc` is a call, returns the address of the
    /// instruction following it.
    fn call_target_return(
        &self,
        space: &AddressSpace,
        memory: &dyn TargetMemory,
        pc: &Address,
    ) -> Option<Address>;
}

/// The execution-control state machine of one session.
pub struct ExecutionControl {
    mode: ExecMode,
    repeat_count: u32,
    entry_line: Option<u32>,
    entry_frame_base: u32,
    internal_breakpoint: Option<BreakpointId>,
    inspector: Option<Box<dyn InstructionInspector>>,
}

impl ExecutionControl {
    /// Creates a controller in the initial [`ExecMode::Continue`] state.
    #[must_use]
    pub fn new() -> ExecutionControl {
        ExecutionControl {
            mode: ExecMode::Continue,
            repeat_count: 0,
            entry_line: None,
            entry_frame_base: 0,
            internal_breakpoint: None,
            inspector: None,
        }
    }

    /// Wires in an instruction inspector for call skipping.
    pub fn set_inspector(&mut self, inspector: Box<dyn InstructionInspector>) {
        self.inspector = Some(inspector);
    }

    /// The current execution mode.
    #[must_use]
    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    /// Arms a mode with a repeat count and computes how to resume.
    ///
    /// `count` is the number of satisfied steps before the stop finalizes
    /// ("step 5 times"); zero behaves as one. The mode-entry line and frame
    /// base are captured here, from the state the target is stopped in.
    pub fn restart_execution(
        &mut self,
        mode: ExecMode,
        count: u32,
        addr: &Address,
        frame_base: u32,
        symbols: &SymbolTable,
    ) -> Resumption {
        self.mode = mode;
        self.repeat_count = count.max(1);
        self.entry_frame_base = frame_base;
        self.entry_line = match symbols.check_lineno_status(addr) {
            LineStatus::OnLine { line } => Some(line),
            _ => None,
        };
        self.internal_breakpoint = None;
        debug!("resuming in mode {mode}, count {}", self.repeat_count);

        match mode {
            ExecMode::Continue => Resumption::free_run(),
            ExecMode::ContinuePassException => Resumption {
                single_step: false,
                pass_exception: true,
            },
            _ => Resumption::single_step(),
        }
    }

    /// Handles one trap and decides whether to halt or keep running.
    ///
    /// Order is fixed: user breakpoints are checked first (a breakpoint hit
    /// halts in any mode), then the stepping rules of the current mode.
    pub fn handle_trap(
        &mut self,
        trap: &TrapEvent,
        breakpoints: &mut BreakpointManager,
        ctx: &mut EvalContext<'_>,
    ) -> TrapDecision {
        trace!("trap at {} in mode {}", trap.addr, self.mode);

        let decision = breakpoints.should_stop(&trap.addr, ctx);
        if decision.stop {
            if decision.breakpoint.is_some() && decision.breakpoint == self.internal_breakpoint {
                // Our own one-shot, not a user breakpoint. A trampoline
                // bounce or a skipped-over call counts as the step itself;
                // a skipped call during source stepping only resumes the
                // interrupted walk toward the next line.
                self.internal_breakpoint = None;
                return match self.mode {
                    ExecMode::StepOverSource | ExecMode::StepIntoSource => {
                        self.handle_source_step(trap, breakpoints, ctx)
                    }
                    _ => self.step_satisfied(trap),
                };
            }
            self.mode = ExecMode::Continue;
            return TrapDecision::Halt(StopReport {
                addr: trap.addr,
                breakpoint: decision.breakpoint,
                condition_error: decision.condition_error,
            });
        }

        match self.mode {
            ExecMode::Continue => TrapDecision::Resume(Resumption::free_run()),

            ExecMode::ContinuePassException => TrapDecision::Resume(Resumption {
                single_step: false,
                pass_exception: trap.exception.is_some(),
            }),

            ExecMode::StepIntoInstruction => self.step_satisfied(trap),

            ExecMode::StepOverInstruction => {
                if let Some(resume) = self.try_skip_call(trap, breakpoints, ctx) {
                    return TrapDecision::Resume(resume);
                }
                if self.frame_too_deep(trap) {
                    return TrapDecision::Resume(Resumption::single_step());
                }
                self.step_satisfied(trap)
            }

            ExecMode::Finish => {
                // Halts only once the entry frame has returned, which on a
                // downward-growing stack means a strictly larger base.
                if trap.context.ebp > self.entry_frame_base {
                    self.step_satisfied(trap)
                } else {
                    TrapDecision::Resume(Resumption::single_step())
                }
            }

            ExecMode::StepOverSource | ExecMode::StepIntoSource | ExecMode::StepOverTrampoline => {
                self.handle_source_step(trap, breakpoints, ctx)
            }
        }
    }

    fn handle_source_step(
        &mut self,
        trap: &TrapEvent,
        breakpoints: &mut BreakpointManager,
        ctx: &mut EvalContext<'_>,
    ) -> TrapDecision {
        match ctx.symbols.check_lineno_status(&trap.addr) {
            LineStatus::NoLines => {
                // Stepped into code with no line information; stopping here
                // beats running away to the next unrelated stop.
                self.step_satisfied(trap)
            }

            LineStatus::NotOnLine => {
                if let Some(resume) = self.try_skip_call(trap, breakpoints, ctx) {
                    return TrapDecision::Resume(resume);
                }
                TrapDecision::Resume(Resumption::single_step())
            }

            LineStatus::OnLine { line } => {
                if Some(line) == self.entry_line && trap.context.ebp == self.entry_frame_base {
                    return TrapDecision::Resume(Resumption::single_step());
                }
                if self.mode.skips_deeper_frames() && self.frame_too_deep(trap) {
                    if let Some(resume) = self.try_skip_call(trap, breakpoints, ctx) {
                        return TrapDecision::Resume(resume);
                    }
                    return TrapDecision::Resume(Resumption::single_step());
                }
                self.step_satisfied(trap)
            }

            LineStatus::IsTrampoline => {
                if self.mode == ExecMode::StepOverTrampoline {
                    return self.bounce_trampoline(trap, breakpoints, ctx);
                }
                // Step-into walks straight through the stub.
                TrapDecision::Resume(Resumption::single_step())
            }
        }
    }

    /// Plants a one-shot breakpoint at the trampoline's real return address
    /// and free-runs until it fires.
    ///
    /// The return address is the stub's, sitting at the top of the stack;
    /// the instruction after the call would be wrong because the stub never
    /// returns there.
    fn bounce_trampoline(
        &mut self,
        trap: &TrapEvent,
        breakpoints: &mut BreakpointManager,
        ctx: &mut EvalContext<'_>,
    ) -> TrapDecision {
        let stack_top = Address::new(trap.context.ss, trap.context.esp);
        match memory::read_u32(ctx.space, ctx.memory, &stack_top, trap.context.ss) {
            Ok(return_offset) => {
                let return_addr = Address::new(trap.addr.segment, return_offset);
                debug!("trampoline at {}, real return {return_addr}", trap.addr);
                self.internal_breakpoint =
                    Some(breakpoints.add_trampoline_breakpoint(return_addr));
                TrapDecision::Resume(Resumption::free_run())
            }
            Err(_) => {
                // Unreadable stack; the safest deterministic outcome is to
                // stop where we are.
                self.step_satisfied(trap)
            }
        }
    }

    /// If step-over sits on a call and an inspector is wired in, plants a
    /// one-shot past the call and free-runs over the callee.
    fn try_skip_call(
        &mut self,
        trap: &TrapEvent,
        breakpoints: &mut BreakpointManager,
        ctx: &EvalContext<'_>,
    ) -> Option<Resumption> {
        if !self.mode.skips_deeper_frames() {
            return None;
        }
        let inspector = self.inspector.as_ref()?;
        let after_call = inspector.call_target_return(ctx.space, ctx.memory, &trap.addr)?;
        trace!("skipping call at {}, resuming at {after_call}", trap.addr);
        self.internal_breakpoint = Some(breakpoints.add_trampoline_breakpoint(after_call));
        Some(Resumption::free_run())
    }

    fn frame_too_deep(&self, trap: &TrapEvent) -> bool {
        trap.context.ebp < self.entry_frame_base
    }

    /// One step of the armed mode completed; either re-arm for the next
    /// repeat or finalize the stop.
    fn step_satisfied(&mut self, trap: &TrapEvent) -> TrapDecision {
        self.repeat_count = self.repeat_count.saturating_sub(1);
        if self.repeat_count > 0 {
            self.entry_frame_base = trap.context.ebp;
            self.entry_line = None;
            if let ExecMode::StepOverSource
            | ExecMode::StepIntoSource
            | ExecMode::StepOverTrampoline
            | ExecMode::StepOverInstruction
            | ExecMode::StepIntoInstruction
            | ExecMode::Finish = self.mode
            {
                return TrapDecision::Resume(Resumption::single_step());
            }
        }
        self.mode = ExecMode::Continue;
        TrapDecision::Halt(StopReport {
            addr: trap.addr,
            breakpoint: None,
            condition_error: None,
        })
    }
}

impl Default for ExecutionControl {
    fn default() -> Self {
        ExecutionControl::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BufferMemory;
    use crate::symbols::{SymbolAttrs, SymbolKind};
    use crate::types::TypeDatabase;

    struct Fixture {
        types: TypeDatabase,
        symbols: SymbolTable,
        space: AddressSpace,
        memory: BufferMemory,
    }

    impl Fixture {
        fn new() -> Fixture {
            let mut symbols = SymbolTable::new();
            // main at 0x100 with lines 10/11/12.
            let main = symbols.add_symbol(
                "main",
                Address::flat(0x100),
                Some("main.c"),
                SymbolKind::Function,
                SymbolAttrs::default(),
            );
            symbols.add_line_number(main, 10, 0x100);
            symbols.add_line_number(main, 11, 0x110);
            symbols.add_line_number(main, 12, 0x120);
            Fixture {
                types: TypeDatabase::new(),
                symbols,
                space: AddressSpace::new(),
                memory: BufferMemory::new(0, 0x10000),
            }
        }

        fn ctx(&mut self) -> EvalContext<'_> {
            EvalContext {
                types: &mut self.types,
                symbols: &self.symbols,
                space: &self.space,
                memory: &self.memory,
                registers: CpuContext::default(),
                current_function: None,
                pc_offset: None,
                line: None,
                frame_base: 0,
            }
        }
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
    fn continue_mode_free_runs_until_breakpoint() {
        let mut fx = Fixture::new();
        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        let id = bps.add(Address::flat(0x110));

        let decision = exec.handle_trap(&trap(0x108, 0x2000), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Resume(r) if !r.single_step));

        let decision = exec.handle_trap(&trap(0x110, 0x2000), &mut bps, &mut fx.ctx());
        match decision {
            TrapDecision::Halt(report) => {
                assert_eq!(report.addr, Address::flat(0x110));
                assert_eq!(report.breakpoint, Some(id));
            }
            TrapDecision::Resume(_) => panic!("expected halt"),
        }
    }

    #[test]
    fn instruction_step_halts_on_every_trap() {
        let mut fx = Fixture::new();
        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        let resume = exec.restart_execution(
            ExecMode::StepIntoInstruction,
            1,
            &Address::flat(0x100),
            0x2000,
            &fx.symbols,
        );
        assert!(resume.single_step);

        let decision = exec.handle_trap(&trap(0x102, 0x2000), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Halt(_)));
        assert_eq!(exec.mode(), ExecMode::Continue);
    }

    #[test]
    fn source_step_over_halts_at_next_line_start() {
        let mut fx = Fixture::new();
        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        exec.restart_execution(
            ExecMode::StepOverSource,
            1,
            &Address::flat(0x100),
            0x2000,
            &fx.symbols,
        );

        // Addresses strictly inside line 10 keep stepping.
        for offset in [0x102, 0x108, 0x10c] {
            let decision = exec.handle_trap(&trap(offset, 0x2000), &mut bps, &mut fx.ctx());
            assert!(
                matches!(decision, TrapDecision::Resume(r) if r.single_step),
                "should keep stepping at {offset:#x}"
            );
        }

        // 0x110 starts line 11: halt.
        let decision = exec.handle_trap(&trap(0x110, 0x2000), &mut bps, &mut fx.ctx());
        match decision {
            TrapDecision::Halt(report) => assert_eq!(report.addr, Address::flat(0x110)),
            TrapDecision::Resume(_) => panic!("expected halt at 0x110"),
        }
    }

    #[test]
    fn source_step_over_skips_deeper_frames() {
        let mut fx = Fixture::new();
        // A callee with its own line table, deeper on the stack.
        let callee = fx.symbols.add_symbol(
            "helper",
            Address::flat(0x300),
            Some("main.c"),
            SymbolKind::Function,
            SymbolAttrs::default(),
        );
        fx.symbols.add_line_number(callee, 40, 0x300);

        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        exec.restart_execution(
            ExecMode::StepOverSource,
            1,
            &Address::flat(0x100),
            0x2000,
            &fx.symbols,
        );

        // On a line start, but the frame is deeper (smaller base): no halt.
        let decision = exec.handle_trap(&trap(0x300, 0x1f00), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Resume(r) if r.single_step));

        // Back in the entry frame on a new line: halt.
        let decision = exec.handle_trap(&trap(0x110, 0x2000), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Halt(_)));
    }

    #[test]
    fn step_into_enters_deeper_frames() {
        let mut fx = Fixture::new();
        let callee = fx.symbols.add_symbol(
            "helper",
            Address::flat(0x300),
            Some("main.c"),
            SymbolKind::Function,
            SymbolAttrs::default(),
        );
        fx.symbols.add_line_number(callee, 40, 0x300);

        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        exec.restart_execution(
            ExecMode::StepIntoSource,
            1,
            &Address::flat(0x100),
            0x2000,
            &fx.symbols,
        );

        let decision = exec.handle_trap(&trap(0x300, 0x1f00), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Halt(_)));
    }

    #[test]
    fn finish_waits_for_shallower_frame() {
        let mut fx = Fixture::new();
        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        exec.restart_execution(
            ExecMode::Finish,
            1,
            &Address::flat(0x300),
            0x1f00,
            &fx.symbols,
        );

        // Same frame: keep going.
        let decision = exec.handle_trap(&trap(0x308, 0x1f00), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Resume(r) if r.single_step));

        // Returned to the caller (larger base): halt.
        let decision = exec.handle_trap(&trap(0x112, 0x2000), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Halt(_)));
    }

    #[test]
    fn repeat_count_rearms_the_mode() {
        let mut fx = Fixture::new();
        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        exec.restart_execution(
            ExecMode::StepIntoInstruction,
            3,
            &Address::flat(0x100),
            0x2000,
            &fx.symbols,
        );

        for offset in [0x102, 0x104] {
            let decision = exec.handle_trap(&trap(offset, 0x2000), &mut bps, &mut fx.ctx());
            assert!(matches!(decision, TrapDecision::Resume(r) if r.single_step));
        }
        let decision = exec.handle_trap(&trap(0x106, 0x2000), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Halt(_)));
    }

    #[test]
    fn finish_repeat_count_pops_two_frames() {
        let mut fx = Fixture::new();
        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        // Three frames deep: bases 0x1e00 < 0x1f00 < 0x2000.
        exec.restart_execution(
            ExecMode::Finish,
            2,
            &Address::flat(0x308),
            0x1e00,
            &fx.symbols,
        );

        // First frame return re-arms instead of stopping.
        let decision = exec.handle_trap(&trap(0x310, 0x1f00), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Resume(r) if r.single_step));

        // Still in the middle frame: keep going.
        let decision = exec.handle_trap(&trap(0x314, 0x1f00), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Resume(r) if r.single_step));

        // Second return reaches the outer frame: halt.
        let decision = exec.handle_trap(&trap(0x116, 0x2000), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Halt(_)));
    }

    #[test]
    fn source_step_repeat_count_walks_two_lines() {
        let mut fx = Fixture::new();
        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        exec.restart_execution(
            ExecMode::StepOverSource,
            2,
            &Address::flat(0x100),
            0x2000,
            &fx.symbols,
        );

        // Off-line and the first new line both resume.
        for offset in [0x104, 0x110, 0x114] {
            let decision = exec.handle_trap(&trap(offset, 0x2000), &mut bps, &mut fx.ctx());
            assert!(matches!(decision, TrapDecision::Resume(r) if r.single_step));
        }
        // Line 12 is the second new line: halt.
        let decision = exec.handle_trap(&trap(0x120, 0x2000), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Halt(_)));
    }

    #[test]
    fn trampoline_bounce_plants_one_shot_and_halts_when_it_fires() {
        let mut fx = Fixture::new();
        // A trampoline stub at 0x500; real return address 0x116 on the stack.
        fx.symbols.add_symbol(
            "thunk",
            Address::flat(0x500),
            None,
            SymbolKind::Win32Export,
            SymbolAttrs {
                trampoline: true,
                step_through: true,
            },
        );
        memory::write_scalar(&fx.space, &mut fx.memory, &Address::flat(0x1efc), 0, 0x116, 4)
            .unwrap();

        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        exec.restart_execution(
            ExecMode::StepOverTrampoline,
            1,
            &Address::flat(0x110),
            0x2000,
            &fx.symbols,
        );

        // Entering the stub: free-run until the planted breakpoint.
        let mut stub_trap = trap(0x500, 0x2000);
        stub_trap.context.esp = 0x1efc;
        let decision = exec.handle_trap(&stub_trap, &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Resume(r) if !r.single_step));
        assert_eq!(bps.len(), 1);

        // The one-shot fires at the real return address: halt, no user
        // breakpoint reported, set consumed.
        let decision = exec.handle_trap(&trap(0x116, 0x2000), &mut bps, &mut fx.ctx());
        match decision {
            TrapDecision::Halt(report) => {
                assert_eq!(report.addr, Address::flat(0x116));
                assert!(report.breakpoint.is_none());
            }
            TrapDecision::Resume(_) => panic!("expected halt at the return address"),
        }
        assert!(bps.is_empty());
    }

    #[test]
    fn pass_exception_reinjects() {
        let mut fx = Fixture::new();
        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        exec.restart_execution(
            ExecMode::ContinuePassException,
            1,
            &Address::flat(0x100),
            0x2000,
            &fx.symbols,
        );

        let mut fault = trap(0x108, 0x2000);
        fault.exception = Some(ExceptionRecord { code: 0xc000_0005 });
        let decision = exec.handle_trap(&fault, &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Resume(r) if r.pass_exception));
    }

    struct CallAt {
        pc: Address,
        next: Address,
    }

    impl InstructionInspector for CallAt {
        fn call_target_return(
            &self,
            _space: &AddressSpace,
            _memory: &dyn TargetMemory,
            pc: &Address,
        ) -> Option<Address> {
            (*pc == self.pc).then_some(self.next)
        }
    }

    #[test]
    fn step_over_with_inspector_jumps_past_the_call() {
        let mut fx = Fixture::new();
        let mut exec = ExecutionControl::new();
        let mut bps = BreakpointManager::new();
        exec.set_inspector(Box::new(CallAt {
            pc: Address::flat(0x108),
            next: Address::flat(0x10d),
        }));
        exec.restart_execution(
            ExecMode::StepOverSource,
            1,
            &Address::flat(0x100),
            0x2000,
            &fx.symbols,
        );

        // On the call: plant a one-shot past it and free-run.
        let decision = exec.handle_trap(&trap(0x108, 0x2000), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Resume(r) if !r.single_step));
        assert_eq!(bps.find(&Address::flat(0x10d)), Some(bps.iter().next().unwrap().id));

        // The one-shot fires past the call, still on line 10: resume
        // stepping toward the next line.
        let decision = exec.handle_trap(&trap(0x10d, 0x2000), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Resume(_)));
        assert!(bps.is_empty());

        let decision = exec.handle_trap(&trap(0x110, 0x2000), &mut bps, &mut fx.ctx());
        assert!(matches!(decision, TrapDecision::Halt(_)));
    }
}
