// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![deny(unsafe_code)]

//! # winscope
//!
//! A symbolic debugger engine for an emulated Windows runtime, built in pure
//! Rust. `winscope` provides the state that makes a debugger a debugger:
//! symbol and type resolution, a C-like typed expression evaluator,
//! breakpoints with conditions, source- and instruction-level stepping, and
//! frame-pointer stack unwinding over a hybrid flat/segmented address space.
//!
//! ## Features
//!
//! - **Hybrid addressing** - Flat, legacy V86-style segmented, and
//!   selector-relative addresses resolved per address at runtime
//! - **Typed evaluation** - C-like expressions over live target memory, with
//!   pointer arithmetic, struct members, array indexing, and casts
//! - **Deterministic stepping** - Eight execution modes, trampoline-aware,
//!   with every trap producing a halt or an explicit resumption
//! - **Fault tolerance** - A bad pointer or broken watch expression is a
//!   reported error, never the end of the session
//!
//! ## Architecture
//!
//! Everything hangs off a [`DebugSession`], constructed at attach time. Its
//! collaborators are traits at the seams: [`TargetMemory`] for byte access
//! into the debugged process, [`InstructionInspector`] for optional
//! call-skipping during step-over. Debug-info ingestion populates the
//! session's [`SymbolTable`](symbols::SymbolTable) and
//! [`TypeDatabase`](types::TypeDatabase) once per loaded binary; the
//! emulated CPU feeds traps to [`DebugSession::handle_trap`].
//!
//! ## Quick Start
//!
//! ```rust
//! use winscope::prelude::*;
//!
//! let memory = BufferMemory::new(0, 0x10000);
//! let mut session = DebugSession::new(Box::new(memory));
//!
//! // Ingestion: one function with a line table.
//! let foo = session.symbols.add_symbol(
//!     "foo",
//!     Address::flat(0x1000),
//!     Some("foo.c"),
//!     SymbolKind::Function,
//!     SymbolAttrs::default(),
//! );
//! session.symbols.add_line_number(foo, 5, 0x1000);
//! session.symbols.add_line_number(foo, 6, 0x1008);
//!
//! // A breakpoint on line 6, by address.
//! session.breakpoints.add(Address::flat(0x1008));
//! ```
//!
//! [`DebugSession`]: session::DebugSession
//! [`DebugSession::handle_trap`]: session::DebugSession::handle_trap
//! [`TargetMemory`]: memory::TargetMemory
//! [`InstructionInspector`]: exec::InstructionInspector

pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// This module provides a curated selection of the most frequently used
/// types from across the winscope library, allowing for convenient glob
/// imports.
///
/// # Example
///
/// ```rust
/// use winscope::prelude::*;
///
/// let mut session = DebugSession::new(Box::new(BufferMemory::new(0, 0x1000)));
/// session.breakpoints.add(Address::flat(0x100));
/// # drop(session);
/// ```
pub mod prelude;

/// Segmented and flat address representation and resolution
///
/// The address model of the engine: [`address::Address`] pairs a segment
/// with an offset, [`address::AddressSpace`] holds the emulated descriptor
/// table and legacy module bases and turns addresses into linear locations.
pub mod address;

/// Breakpoint bookkeeping: installation, conditions, stop decisions
pub mod breakpoints;

/// Watch expressions re-evaluated at every stop
pub mod display;

/// Execution control: stepping modes and trap handling
///
/// The state machine that decides, for every trap the emulated CPU
/// delivers, whether the debugger halts or how the target resumes.
pub mod exec;

/// Typed expression trees and their evaluation against live target state
pub mod expr;

/// The target-memory seam and checked, address-resolving accessors
pub mod memory;

/// CPU register names and snapshots
pub mod registers;

/// The session object tying all components to one debugged target
pub mod session;

/// Call-stack unwinding and frame focus
pub mod stack;

/// Symbols, line tables, and function-scoped locals
pub mod symbols;

/// C-like type descriptors and typed address math
pub mod types;

pub use error::{Error, Result};
