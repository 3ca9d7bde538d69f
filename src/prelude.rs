//! # winscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used
//! types and traits from the winscope library. Import this module to get
//! quick access to the essential types for driving a debug session.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all winscope operations
pub use crate::Error;

/// The result type used throughout winscope
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The session object owning all engine state for one attached target
pub use crate::session::{DebugSession, StopEvent, TrapOutcome};

// ================================================================================================
// Address Model
// ================================================================================================

/// Segment/offset addresses and the resolving address space
pub use crate::address::{Address, AddressClass, AddressSpace, CURRENT_SEGMENT};

// ================================================================================================
// Target Access
// ================================================================================================

/// The byte-level seam into the debugged process, plus a buffer-backed
/// implementation for tests and in-process targets
pub use crate::memory::{BufferMemory, TargetMemory};

/// Register names and snapshots
pub use crate::registers::{CpuContext, Register};

// ================================================================================================
// Symbols and Types
// ================================================================================================

/// Symbol table entry points
pub use crate::symbols::{
    LineStatus, LocalLocation, SymbolAttrs, SymbolFilter, SymbolId, SymbolKind, SymbolTable,
};

/// Type database entry points
pub use crate::types::{TypeClass, TypeDatabase, TypeId, TypeKind};

// ================================================================================================
// Expressions, Breakpoints, Execution
// ================================================================================================

/// Expression trees and evaluation
pub use crate::expr::{BinaryOp, EvalContext, Expr, Place, TypedValue, UnaryOp};

/// Breakpoint installation and stop decisions
pub use crate::breakpoints::{BreakpointId, BreakpointKind, BreakpointManager};

/// Execution modes, traps, and resume instructions
pub use crate::exec::{
    ExecMode, ExceptionRecord, ExecutionControl, InstructionInspector, Resumption, TrapDecision,
    TrapEvent,
};

/// Stack frames and the navigator
pub use crate::stack::{Frame, FrameNavigator};

/// Watch displays
pub use crate::display::{DisplayFormat, DisplayId, DisplayManager, DisplayReport};
