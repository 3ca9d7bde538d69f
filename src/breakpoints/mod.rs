//! Breakpoint bookkeeping and stop decisions.
//!
//! The manager owns the full breakpoint set of one session. Identifiers are
//! stable and monotonic: deleting a breakpoint never recycles its id, and
//! re-adding at the same address yields a fresh one, so stale ids in user
//! command history can never alias a newer breakpoint.
//!
//! On every trap the execution controller asks [`BreakpointManager::should_stop`]
//! whether the trap address carries a live breakpoint. A condition that
//! fails to evaluate stops anyway: a broken condition must never silently
//! skip a stop the user asked for, so the error rides along in the
//! [`StopDecision`] for reporting.

use log::warn;

use crate::address::Address;
use crate::expr::{self, EvalContext, Expr};
use crate::Error;

/// Stable handle to a breakpoint, unique for the session lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BreakpointId(u32);

impl BreakpointId {
    /// Returns the raw id value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

/// How a breakpoint came to exist and how long it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    /// User breakpoint; persists until deleted
    Plain,
    /// Planted at a trampoline's real return address; removed on first hit
    Trampoline,
    /// Planted at a task's entry point at creation; removed on first hit
    TaskEntry,
}

impl BreakpointKind {
    fn one_shot(self) -> bool {
        !matches!(self, BreakpointKind::Plain)
    }
}

/// One installed breakpoint.
#[derive(Debug)]
pub struct Breakpoint {
    /// Session-unique identifier
    pub id: BreakpointId,
    /// Where it is installed
    pub addr: Address,
    /// Disabled breakpoints are kept but never stop
    pub enabled: bool,
    /// Optional stop condition, owned by the breakpoint
    pub condition: Option<Expr>,
    /// Number of times this breakpoint has stopped execution
    pub hit_count: u32,
    /// Lifetime class
    pub kind: BreakpointKind,
}

/// The manager's verdict for one trap address.
#[derive(Debug)]
pub struct StopDecision {
    /// Whether execution must halt here
    pub stop: bool,
    /// The breakpoint that caused the stop, if any
    pub breakpoint: Option<BreakpointId>,
    /// Condition evaluation failure, reported alongside the stop
    pub condition_error: Option<Error>,
}

impl StopDecision {
    fn pass() -> StopDecision {
        StopDecision {
            stop: false,
            breakpoint: None,
            condition_error: None,
        }
    }
}

/// All breakpoints of one debug session.
///
/// The set stays small in practice, so lookups are linear scans; nothing
/// here is on a hot path relative to actually running the target.
#[derive(Debug, Default)]
pub struct BreakpointManager {
    entries: Vec<Breakpoint>,
    next_id: u32,
}

impl BreakpointManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> BreakpointManager {
        BreakpointManager::default()
    }

    /// Number of installed breakpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no breakpoints are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the installed breakpoints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.entries.iter()
    }

    fn install(&mut self, addr: Address, kind: BreakpointKind) -> BreakpointId {
        let id = BreakpointId(self.next_id);
        self.next_id += 1;
        self.entries.push(Breakpoint {
            id,
            addr,
            enabled: true,
            condition: None,
            hit_count: 0,
            kind,
        });
        id
    }

    /// Installs a user breakpoint at `addr`.
    pub fn add(&mut self, addr: Address) -> BreakpointId {
        self.install(addr, BreakpointKind::Plain)
    }

    /// Installs a one-shot breakpoint at a trampoline's real return address.
    pub fn add_trampoline_breakpoint(&mut self, return_addr: Address) -> BreakpointId {
        self.install(return_addr, BreakpointKind::Trampoline)
    }

    /// Installs a one-shot breakpoint at a newly created task's entry point.
    ///
    /// The task collaborator resolves the entry address at creation time;
    /// the manager only records it.
    pub fn add_task_entry_breakpoint(&mut self, entry_addr: Address) -> BreakpointId {
        self.install(entry_addr, BreakpointKind::TaskEntry)
    }

    /// Removes a breakpoint. Returns false if the id is unknown (already
    /// deleted, or consumed as a one-shot).
    pub fn delete(&mut self, id: BreakpointId) -> bool {
        match self.entries.iter().position(|bp| bp.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Enables or disables a breakpoint without forgetting it.
    pub fn enable(&mut self, id: BreakpointId, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|bp| bp.id == id) {
            Some(bp) => {
                bp.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// The breakpoint installed at `addr`, if any.
    #[must_use]
    pub fn find(&self, addr: &Address) -> Option<BreakpointId> {
        self.entries.iter().find(|bp| bp.addr == *addr).map(|bp| bp.id)
    }

    /// Looks at a breakpoint by id.
    #[must_use]
    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.entries.iter().find(|bp| bp.id == id)
    }

    /// Attaches a stop condition, replacing any prior one.
    ///
    /// The manager takes ownership of the expression and re-evaluates it on
    /// every hit.
    pub fn add_condition(&mut self, id: BreakpointId, condition: Expr) -> bool {
        match self.entries.iter_mut().find(|bp| bp.id == id) {
            Some(bp) => {
                bp.condition = Some(condition);
                true
            }
            None => false,
        }
    }

    /// Decides whether the trap at `addr` stops execution.
    ///
    /// No breakpoint or a disabled one passes through. A conditional
    /// breakpoint evaluates its condition against the live context: a
    /// non-zero result stops, zero passes, and an evaluation failure stops
    /// conservatively with the error carried in the decision. Hit counts
    /// increment on every stop; one-shot breakpoints are consumed by it.
    pub fn should_stop(&mut self, addr: &Address, ctx: &mut EvalContext<'_>) -> StopDecision {
        let Some(index) = self.entries.iter().position(|bp| bp.addr == *addr) else {
            return StopDecision::pass();
        };
        if !self.entries[index].enabled {
            return StopDecision::pass();
        }

        let mut condition_error = None;
        if let Some(condition) = self.entries[index].condition.clone() {
            match expr::evaluate(&condition, ctx)
                .and_then(|value| expr::load(ctx, &value))
            {
                Ok(0) => return StopDecision::pass(),
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        "breakpoint {} condition failed, stopping anyway: {err}",
                        self.entries[index].id.value()
                    );
                    condition_error = Some(err);
                }
            }
        }

        let id = self.entries[index].id;
        self.entries[index].hit_count += 1;
        if self.entries[index].kind.one_shot() {
            self.entries.remove(index);
        }
        StopDecision {
            stop: true,
            breakpoint: Some(id),
            condition_error,
        }
    }
}
