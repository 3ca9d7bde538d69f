//! Symbol table: names, addresses, line numbers, and scoped locals.
//!
//! Built once per debug session from ingested debug information, then
//! queried continuously: by exact name for expressions, by
//! nearest-address-at-or-before for backtraces, and by line for breakpoint
//! placement and stepping. Symbols live in an arena addressed by
//! [`SymbolId`] handles; nothing is freed before session end.
//!
//! # Key Components
//!
//! - [`SymbolTable`] - Arena plus name index
//! - [`Symbol`], [`SymbolKind`], [`SymbolAttrs`] - What a symbol is
//! - [`SymbolFilter`] - Which kinds a lookup considers
//! - [`LineStatus`] - Drives step-over decisions in execution control
//!
//! # Invariants
//!
//! - Nearest-symbol search returns the tightest enclosing symbol, never one
//!   that starts after the query address; equal addresses resolve to the
//!   most recently added symbol.
//! - Line tables keep their ingestion order; offsets arrive non-decreasing
//!   and are never re-sorted.
//! - A local variable is visible only while the program counter lies inside
//!   its declared pc range.

use std::collections::HashMap;

use bitflags::bitflags;

use crate::address::Address;
use crate::registers::Register;
use crate::types::TypeId;
use crate::{Error, Result};

/// Stable handle to a symbol in a [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Returns the raw index of this handle.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a symbol names. The kinds are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A function in the debugged program
    Function,
    /// A data object
    Data,
    /// An export of an emulated Win32 module
    Win32Export,
    /// A symbol internal to the compatibility runtime itself
    InternalRuntime,
    /// A placeholder that lookups must skip
    Invalid,
}

/// Orthogonal symbol attributes; either may combine with any kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolAttrs {
    /// The symbol is a forwarding stub; stepping must see through it
    pub trampoline: bool,
    /// Stepping should pass through without stopping
    pub step_through: bool,
}

bitflags! {
    /// Which symbol kinds a lookup considers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolFilter: u32 {
        /// Match function symbols
        const FUNCTION = 1 << 0;
        /// Match data symbols
        const DATA = 1 << 1;
        /// Match Win32 module exports
        const WIN32_EXPORT = 1 << 2;
        /// Match runtime-internal symbols
        const INTERNAL_RUNTIME = 1 << 3;
    }
}

impl SymbolFilter {
    /// Matches every valid symbol kind.
    pub const ANY: SymbolFilter = SymbolFilter::all();

    fn accepts(self, kind: SymbolKind) -> bool {
        match kind {
            SymbolKind::Function => self.contains(SymbolFilter::FUNCTION),
            SymbolKind::Data => self.contains(SymbolFilter::DATA),
            SymbolKind::Win32Export => self.contains(SymbolFilter::WIN32_EXPORT),
            SymbolKind::InternalRuntime => self.contains(SymbolFilter::INTERNAL_RUNTIME),
            SymbolKind::Invalid => false,
        }
    }
}

/// One `{line, offset}` pair of a function's line-number table.
///
/// The offset is absolute within the symbol's segment, as ingested.
#[derive(Debug, Clone, Copy)]
pub struct LineEntry {
    /// Source line number
    pub line: u32,
    /// Segment offset of the first instruction of that line
    pub offset: u32,
}

/// Where the current address sits relative to line information.
///
/// Returned by [`SymbolTable::check_lineno_status`]; execution control uses
/// it to decide what a source-granular step should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// The enclosing function carries no line table (or there is none)
    NoLines,
    /// Inside a function with lines, but not at the start of one
    NotOnLine,
    /// Exactly at the first instruction of a source line
    OnLine {
        /// The source line at this address
        line: u32,
    },
    /// The enclosing symbol is a trampoline stub
    IsTrampoline,
}

/// Storage of a local variable: a register or a frame-base offset.
#[derive(Debug, Clone, Copy)]
pub enum LocalLocation {
    /// Parked in a CPU register
    Register(Register),
    /// At a signed offset from the frame base
    Stack(i32),
}

/// A function-scoped variable with its visibility range.
///
/// The pc range is relative to the function's defining address; the local
/// resolves only while the program counter lies within it.
#[derive(Debug, Clone)]
pub struct Local {
    /// Variable name
    pub name: String,
    /// Where the variable lives
    pub location: LocalLocation,
    /// First pc offset (relative to the function start) where visible
    pub pc_start: u32,
    /// One past the last visible pc offset
    pub pc_end: u32,
    /// Variable type, once the ingester resolves one
    pub type_id: Option<TypeId>,
}

/// Handle to a local variable of a particular function symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalId {
    func: SymbolId,
    index: u32,
}

/// A named, typed location in the debugged program.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Symbol name; names are not required to be unique
    pub name: String,
    /// Defining address
    pub addr: Address,
    /// Source file, when the debug info named one
    pub file: Option<String>,
    /// What the symbol names
    pub kind: SymbolKind,
    /// Orthogonal attributes
    pub attrs: SymbolAttrs,
    /// Symbol type, once known
    pub type_id: Option<TypeId>,
    /// Extent in bytes, once known
    pub size: Option<u32>,
    /// Function-scoped variables
    pub locals: Vec<Local>,
    /// Ordered line table; offsets non-decreasing as ingested
    pub lines: Vec<LineEntry>,
    /// Offset past the prologue, for breakpoint placement at the entry line
    pub breakpoint_offset: u32,
}

/// Arena of symbols plus a name index, for one debug session.
///
/// Populated by the debug-info ingester through the mutation operations;
/// per-entry ingestion failures are tolerated by the caller (skip and
/// continue), never fatal.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, Vec<SymbolId>>,
}

impl SymbolTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Number of symbols in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the table holds no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Looks at the symbol behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this table.
    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    fn push(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    /// Adds a symbol and registers it for name lookup.
    ///
    /// Names need not be unique; later additions shadow earlier ones in
    /// name lookups unless scoping disambiguates.
    pub fn add_symbol(
        &mut self,
        name: &str,
        addr: Address,
        file: Option<&str>,
        kind: SymbolKind,
        attrs: SymbolAttrs,
    ) -> SymbolId {
        let id = self.push(Symbol {
            name: name.to_string(),
            addr,
            file: file.map(str::to_string),
            kind,
            attrs,
            type_id: None,
            size: None,
            locals: Vec::new(),
            lines: Vec::new(),
            breakpoint_offset: 0,
        });
        self.by_name.entry(name.to_string()).or_default().push(id);
        id
    }

    /// Adds an address-to-name mapping without a forward name lookup.
    ///
    /// Supports anonymous and static symbols that backtraces must still
    /// name but which expressions cannot reference.
    pub fn add_inverse_symbol(&mut self, name: &str, addr: Address, file: Option<&str>) -> SymbolId {
        self.push(Symbol {
            name: name.to_string(),
            addr,
            file: file.map(str::to_string),
            kind: SymbolKind::Function,
            attrs: SymbolAttrs::default(),
            type_id: None,
            size: None,
            locals: Vec::new(),
            lines: Vec::new(),
            breakpoint_offset: 0,
        })
    }

    /// Records the type of a symbol.
    pub fn set_symbol_type(&mut self, id: SymbolId, type_id: TypeId) {
        self.symbols[id.index()].type_id = Some(type_id);
    }

    /// Records the extent of a symbol in bytes.
    pub fn set_symbol_size(&mut self, id: SymbolId, size: u32) {
        self.symbols[id.index()].size = Some(size);
    }

    /// Records the prologue length of a function.
    ///
    /// Breakpoints placed at the function's entry line land past the
    /// prologue so that arguments are readable when the stop reports.
    pub fn set_breakpoint_offset(&mut self, id: SymbolId, offset: u32) {
        self.symbols[id.index()].breakpoint_offset = offset;
    }

    /// Resolves a name to an address, optionally narrowed by a source line.
    ///
    /// The most recently added match wins. When `line` is given and the
    /// winning candidate carries a line table, a symbol whose table contains
    /// that exact line is preferred and the line's own address is returned.
    #[must_use]
    pub fn get_symbol_value(&self, name: &str, line: Option<u32>) -> Option<Address> {
        let candidates = self.by_name.get(name)?;
        if let Some(wanted) = line {
            for id in candidates.iter().rev() {
                let sym = &self.symbols[id.index()];
                if let Some(entry) = sym.lines.iter().find(|e| e.line == wanted) {
                    return Some(Address::new(sym.addr.segment, entry.offset));
                }
            }
        }
        candidates
            .last()
            .map(|id| self.symbols[id.index()].addr)
    }

    /// The most recently added symbol with this exact name, if any.
    ///
    /// Inverse symbols are not name-indexed and never match.
    #[must_use]
    pub fn lookup_symbol(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).and_then(|ids| ids.last().copied())
    }

    fn segments_compatible(a: u32, b: u32) -> bool {
        a == 0 || b == 0 || a == b
    }

    /// Finds the symbol with the greatest defining address at or before
    /// `addr`.
    ///
    /// Only symbols accepted by `filter` and in a compatible segment are
    /// considered; [`SymbolKind::Invalid`] entries never match. For two
    /// symbols at the same address the most recently added wins. Returns
    /// `None` when every candidate starts after `addr`.
    #[must_use]
    pub fn find_nearest_symbol(
        &self,
        addr: &Address,
        filter: SymbolFilter,
    ) -> Option<(SymbolId, &Symbol)> {
        let mut best: Option<SymbolId> = None;
        for (index, sym) in self.symbols.iter().enumerate() {
            if !filter.accepts(sym.kind) {
                continue;
            }
            if !Self::segments_compatible(sym.addr.segment, addr.segment) {
                continue;
            }
            if sym.addr.offset > addr.offset {
                continue;
            }
            // Ascending id order: replacing on >= makes ties resolve to the
            // latest-inserted symbol.
            match best {
                Some(current) if sym.addr.offset < self.symbols[current.index()].addr.offset => {}
                _ => best = Some(SymbolId(index as u32)),
            }
        }
        best.map(|id| (id, &self.symbols[id.index()]))
    }

    /// Appends a line-number entry to a function's table.
    ///
    /// Offsets must arrive non-decreasing; the table is never re-sorted.
    pub fn add_line_number(&mut self, id: SymbolId, line: u32, offset: u32) {
        let lines = &mut self.symbols[id.index()].lines;
        debug_assert!(
            lines.last().map(|e| e.offset <= offset).unwrap_or(true),
            "line offsets must be non-decreasing"
        );
        lines.push(LineEntry { line, offset });
    }

    /// Finds the address of a source line within a function.
    ///
    /// Picks the smallest-offset entry whose line is at or past the
    /// requested one. With `bp_flag` set, a hit on the function's entry
    /// point is moved past the recorded prologue so a breakpoint there
    /// stops with the frame set up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoLineInfo`] if the symbol carries no line table or
    /// no entry reaches the requested line.
    pub fn get_line_number_address(
        &self,
        id: SymbolId,
        line: u32,
        bp_flag: bool,
    ) -> Result<Address> {
        let sym = &self.symbols[id.index()];
        if sym.lines.is_empty() {
            return Err(Error::NoLineInfo(sym.name.clone()));
        }
        let entry = sym
            .lines
            .iter()
            .find(|e| e.line >= line)
            .ok_or_else(|| Error::NoLineInfo(sym.name.clone()))?;
        let mut addr = Address::new(sym.addr.segment, entry.offset);
        if bp_flag && addr.offset == sym.addr.offset {
            addr = addr.advanced(sym.breakpoint_offset);
        }
        Ok(addr)
    }

    /// The last line whose address is at or before `offset` within a
    /// symbol, for stop reports.
    #[must_use]
    pub fn nearest_line(&self, id: SymbolId, offset: u32) -> Option<u32> {
        self.symbols[id.index()]
            .lines
            .iter()
            .take_while(|e| e.offset <= offset)
            .last()
            .map(|e| e.line)
    }

    /// Classifies an address for step decisions.
    ///
    /// Trampoline symbols report [`LineStatus::IsTrampoline`] regardless of
    /// line information. An address outside any function, or inside one
    /// ingested without lines, reports [`LineStatus::NoLines`].
    #[must_use]
    pub fn check_lineno_status(&self, addr: &Address) -> LineStatus {
        let Some((_, sym)) = self.find_nearest_symbol(
            addr,
            SymbolFilter::FUNCTION | SymbolFilter::WIN32_EXPORT | SymbolFilter::INTERNAL_RUNTIME,
        ) else {
            return LineStatus::NoLines;
        };
        if sym.attrs.trampoline {
            return LineStatus::IsTrampoline;
        }
        if sym.lines.is_empty() {
            return LineStatus::NoLines;
        }
        match sym.lines.iter().find(|e| e.offset == addr.offset) {
            Some(entry) => LineStatus::OnLine { line: entry.line },
            None => LineStatus::NotOnLine,
        }
    }

    /// Attaches a scoped variable to a function.
    pub fn add_local(
        &mut self,
        func: SymbolId,
        location: LocalLocation,
        pc_start: u32,
        pc_end: u32,
        name: &str,
    ) -> LocalId {
        let locals = &mut self.symbols[func.index()].locals;
        locals.push(Local {
            name: name.to_string(),
            location,
            pc_start,
            pc_end,
            type_id: None,
        });
        LocalId {
            func,
            index: (locals.len() - 1) as u32,
        }
    }

    /// Records the type of a local variable.
    pub fn set_local_type(&mut self, id: LocalId, type_id: TypeId) {
        self.symbols[id.func.index()].locals[id.index as usize].type_id = Some(type_id);
    }

    /// Resolves a local of `func` visible at the given pc offset.
    ///
    /// Lexical blocks ingest outermost-first, so scanning from the back
    /// yields the innermost matching scope.
    #[must_use]
    pub fn find_local(&self, func: SymbolId, name: &str, pc_offset: u32) -> Option<&Local> {
        self.symbols[func.index()]
            .locals
            .iter()
            .rev()
            .find(|local| {
                local.name == name && pc_offset >= local.pc_start && pc_offset < local.pc_end
            })
    }
}
