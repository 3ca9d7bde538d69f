use thiserror::Error;

use crate::address::Address;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers every failure mode of the debugger engine: address
/// resolution, target memory validation, symbol and type lookups, and typed
/// expression evaluation. Each variant carries the context needed to report
/// the failure to the user without terminating the debug session.
///
/// # Error Categories
///
/// ## Address and Memory Errors
/// - [`Error::InvalidSelector`] - A selector-relative address names an unknown selector
/// - [`Error::BadPointer`] - A resolved location failed the readability/writability check
///
/// ## Symbol and Type Errors
/// - [`Error::UnknownSymbol`] - Name lookup found no matching symbol
/// - [`Error::NoSuchField`] - Struct member lookup failed
/// - [`Error::NotAPointer`] - Dereference of a non-pointer, non-array type
/// - [`Error::NoLineInfo`] - A function symbol carries no line-number table
///
/// ## Expression Errors
/// - [`Error::NotAnLvalue`] - The expression result has no memory backing
/// - [`Error::TypeMismatch`] - Operand types are incompatible for the operator
/// - [`Error::DivisionByZero`] - Integer division or remainder by zero
/// - [`Error::UnknownFunction`] - A call names no debugger builtin
/// - [`Error::Eval`] - Wraps any of the above when it surfaces during evaluation
///
/// # Recovery Policy
///
/// None of these conditions is fatal. Address and memory failures are
/// recovered at the point of use and reported with the offending address.
/// A failed watch expression does not block the remaining watches, and a
/// breakpoint whose condition fails to evaluate stops conservatively rather
/// than being skipped.
///
/// # Examples
///
/// ```rust
/// use winscope::{Error, address::{Address, AddressSpace}};
///
/// let space = AddressSpace::new();
/// let addr = Address::new(0x00AB, 0x10); // unknown selector
/// match space.resolve(&addr, 0) {
///     Ok(linear) => println!("linear location {linear:#x}"),
///     Err(Error::InvalidSelector { selector }) => {
///         eprintln!("no descriptor for selector {selector:#06x}");
///     }
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A selector-relative address could not be translated.
    ///
    /// The segment value does not denote the flat class, is not a legacy
    /// segmented address, and the emulated descriptor table has no entry
    /// for it.
    #[error("no descriptor table entry for selector {selector:#06x}")]
    InvalidSelector {
        /// The selector that has no descriptor table entry
        selector: u32,
    },

    /// A memory access failed the readability or writability check.
    ///
    /// The address resolved to a linear location, but the target's memory
    /// map rejects an access of the required length. The access is not
    /// attempted; the offending address is reported instead.
    #[error("invalid address {addr} ({len} bytes)")]
    BadPointer {
        /// The address that failed validation
        addr: Address,
        /// The byte count the failed access required
        len: u32,
    },

    /// Name lookup found no matching symbol.
    ///
    /// Neither an in-scope local of the current frame nor any symbol table
    /// entry matches the requested name.
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),

    /// Struct member lookup failed.
    ///
    /// The base type resolved to a struct, but it declares no field with
    /// the requested name.
    #[error("no field '{0}' in struct")]
    NoSuchField(String),

    /// Attempted to dereference a value whose type is neither pointer nor array.
    #[error("not a pointer type")]
    NotAPointer,

    /// The expression result denotes no memory location.
    ///
    /// Constants and register reads produce immediate values; taking their
    /// address or assigning through them is rejected.
    #[error("expression is not an lvalue")]
    NotAnLvalue,

    /// Operand types are incompatible for the requested operation.
    ///
    /// Raised for example when subtracting pointers to different pointee
    /// types, where no element count can be produced.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Integer division or remainder with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,

    /// A call expression names no debugger builtin.
    ///
    /// Calls are restricted to builtin functions of the expression engine;
    /// arbitrary target-process calls are never made.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// The symbol carries no line-number table.
    ///
    /// Line-granular queries against a function ingested without line
    /// information fail with this error rather than guessing an address.
    #[error("no line number information for '{0}'")]
    NoLineInfo(String),

    /// An error surfaced while evaluating an expression tree.
    ///
    /// Wraps the underlying failure so that callers evaluating many
    /// expressions (watch displays, breakpoint conditions) can isolate and
    /// report each failed evaluation without aborting the others.
    #[error("expression evaluation failed: {0}")]
    Eval(#[source] Box<Error>),
}

/// Specialized [`Result`](core::result::Result) type with [`Error`] as the
/// failure case, used throughout the library.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Wraps this error as an evaluation failure, unless it already is one.
    #[must_use]
    pub fn into_eval(self) -> Error {
        match self {
            Error::Eval(_) => self,
            other => Error::Eval(Box::new(other)),
        }
    }
}
