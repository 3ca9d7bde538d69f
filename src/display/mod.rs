//! Watch expressions re-evaluated at every stop.
//!
//! Each registered display owns its expression tree and a format selector.
//! After every halt the session asks the manager to [`refresh`], which
//! evaluates every enabled entry against the focus frame and renders the
//! result. A failing entry reports its error in place and never blocks the
//! entries after it: the target may simply have left the scope a watched
//! local lives in.
//!
//! [`refresh`]: DisplayManager::refresh

use std::fmt::Write as _;

use log::warn;

use crate::expr::{self, EvalContext, Expr, Place};
use crate::types::TypeKind;
use crate::Error;

/// Stable handle to a registered display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayId(u32);

impl DisplayId {
    /// Returns the raw id value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

/// How a display renders its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayFormat {
    /// Signed decimal
    #[default]
    Decimal,
    /// Zero-padded hexadecimal
    Hex,
    /// A character, with non-printable bytes escaped
    Char,
}

/// One registered watch.
#[derive(Debug)]
pub struct DisplayEntry {
    /// Session-unique identifier
    pub id: DisplayId,
    /// The watched expression, owned by the entry
    pub expr: Expr,
    /// Render format
    pub format: DisplayFormat,
    /// Disabled entries are kept but skipped on refresh
    pub enabled: bool,
}

/// The outcome of refreshing one display.
#[derive(Debug)]
pub struct DisplayReport {
    /// Which display this is
    pub id: DisplayId,
    /// Rendered value, or the error that evaluation hit
    pub value: Result<String, Error>,
}

/// All watch expressions of one session.
#[derive(Debug, Default)]
pub struct DisplayManager {
    entries: Vec<DisplayEntry>,
    next_id: u32,
}

impl DisplayManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> DisplayManager {
        DisplayManager::default()
    }

    /// Number of registered displays, enabled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no displays are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers a watch expression, taking ownership of the tree.
    pub fn add(&mut self, expr: Expr, format: DisplayFormat) -> DisplayId {
        let id = DisplayId(self.next_id);
        self.next_id += 1;
        self.entries.push(DisplayEntry {
            id,
            expr,
            format,
            enabled: true,
        });
        id
    }

    /// Removes a display. Returns false if the id is unknown.
    pub fn delete(&mut self, id: DisplayId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Enables or disables a display without forgetting it.
    pub fn enable(&mut self, id: DisplayId, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Re-evaluates every enabled display against the current stop.
    ///
    /// Reports come back in registration order. A failed entry carries its
    /// error in the report; evaluation of the remaining entries proceeds.
    pub fn refresh(&mut self, ctx: &mut EvalContext<'_>) -> Vec<DisplayReport> {
        let mut reports = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !entry.enabled {
                continue;
            }
            let value = render(&entry.expr, entry.format, ctx);
            if let Err(err) = &value {
                warn!("display {} failed: {err}", entry.id.value());
            }
            reports.push(DisplayReport {
                id: entry.id,
                value,
            });
        }
        reports
    }
}

fn render(expr: &Expr, format: DisplayFormat, ctx: &mut EvalContext<'_>) -> Result<String, Error> {
    let value = expr::evaluate(expr, ctx)?;

    if let Place::Str(text) = &value.place {
        let mut out = String::with_capacity(text.len() + 2);
        out.push('"');
        out.push_str(text);
        out.push('"');
        return Ok(out);
    }

    let scalar = expr::load(ctx, &value)?;
    let mut out = String::new();
    match format {
        DisplayFormat::Decimal => {
            let _ = write!(out, "{scalar}");
        }
        DisplayFormat::Hex => {
            let width = ctx.types.object_size(value.type_id).clamp(1, 4) as usize * 2;
            let _ = write!(out, "{:#0w$x}", scalar as u32, w = width + 2);
        }
        DisplayFormat::Char => {
            let byte = scalar as u8;
            if byte.is_ascii_graphic() || byte == b' ' {
                let _ = write!(out, "'{}'", byte as char);
            } else {
                let _ = write!(out, "'\\x{byte:02x}'");
            }
        }
    }

    if let TypeKind::Enum { members, .. } = ctx.types.kind(ctx.types.strip(value.type_id)) {
        if let Some((name, _)) = members.iter().find(|(_, v)| *v == scalar) {
            let _ = write!(out, " ({name})");
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, AddressSpace};
    use crate::expr::BinaryOp;
    use crate::memory::{self, BufferMemory};
    use crate::registers::CpuContext;
    use crate::symbols::{SymbolAttrs, SymbolKind, SymbolTable};
    use crate::types::TypeDatabase;

    struct Fixture {
        types: TypeDatabase,
        symbols: SymbolTable,
        space: AddressSpace,
        memory: BufferMemory,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture {
                types: TypeDatabase::new(),
                symbols: SymbolTable::new(),
                space: AddressSpace::new(),
                memory: BufferMemory::new(0x1000, 0x1000),
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

        fn add_int(&mut self, name: &str, at: u32, value: u32) {
            let int_ty = self.types.int_type();
            let id = self.symbols.add_symbol(
                name,
                Address::flat(at),
                None,
                SymbolKind::Data,
                SymbolAttrs::default(),
            );
            self.symbols.set_symbol_type(id, int_ty);
            memory::write_scalar(
                &self.space,
                &mut self.memory,
                &Address::flat(at),
                0,
                u64::from(value),
                4,
            )
            .unwrap();
        }
    }

    #[test]
    fn refresh_reports_in_registration_order() {
        let mut fx = Fixture::new();
        fx.add_int("a", 0x1010, 5);
        fx.add_int("b", 0x1014, 0x2a);

        let mut displays = DisplayManager::new();
        let first = displays.add(Expr::Symbol("a".to_string()), DisplayFormat::Decimal);
        let second = displays.add(Expr::Symbol("b".to_string()), DisplayFormat::Hex);

        let reports = displays.refresh(&mut fx.ctx());
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].id, first);
        assert_eq!(reports[0].value.as_deref().unwrap(), "5");
        assert_eq!(reports[1].id, second);
        assert_eq!(reports[1].value.as_deref().unwrap(), "0x0000002a");
    }

    #[test]
    fn failing_entry_does_not_block_the_rest() {
        let mut fx = Fixture::new();
        fx.add_int("ok", 0x1010, 1);

        let mut displays = DisplayManager::new();
        let broken = displays.add(Expr::Symbol("gone".to_string()), DisplayFormat::Decimal);
        let fine = displays.add(Expr::Symbol("ok".to_string()), DisplayFormat::Decimal);

        let reports = displays.refresh(&mut fx.ctx());
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].id, broken);
        assert!(matches!(reports[0].value, Err(Error::Eval(_))));
        assert_eq!(reports[1].id, fine);
        assert_eq!(reports[1].value.as_deref().unwrap(), "1");
    }

    #[test]
    fn delete_and_disable_by_id() {
        let mut fx = Fixture::new();
        fx.add_int("a", 0x1010, 1);
        fx.add_int("b", 0x1014, 2);

        let mut displays = DisplayManager::new();
        let first = displays.add(Expr::Symbol("a".to_string()), DisplayFormat::Decimal);
        let second = displays.add(Expr::Symbol("b".to_string()), DisplayFormat::Decimal);

        assert!(displays.enable(first, false));
        let reports = displays.refresh(&mut fx.ctx());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, second);

        assert!(displays.delete(second));
        assert!(!displays.delete(second));
        assert!(displays.refresh(&mut fx.ctx()).is_empty());
    }

    #[test]
    fn char_format_escapes_non_printable() {
        let mut fx = Fixture::new();
        fx.add_int("c", 0x1010, u32::from(b'A'));
        fx.add_int("nl", 0x1014, 10);

        let mut displays = DisplayManager::new();
        displays.add(Expr::Symbol("c".to_string()), DisplayFormat::Char);
        displays.add(Expr::Symbol("nl".to_string()), DisplayFormat::Char);

        let reports = displays.refresh(&mut fx.ctx());
        assert_eq!(reports[0].value.as_deref().unwrap(), "'A'");
        assert_eq!(reports[1].value.as_deref().unwrap(), "'\\x0a'");
    }

    #[test]
    fn expressions_reread_live_state() {
        let mut fx = Fixture::new();
        fx.add_int("x", 0x1010, 1);

        let mut displays = DisplayManager::new();
        displays.add(
            Expr::Binary {
                op: BinaryOp::Mul,
                lhs: Box::new(Expr::Symbol("x".to_string())),
                rhs: Box::new(Expr::IntConst(10)),
            },
            DisplayFormat::Decimal,
        );

        let reports = displays.refresh(&mut fx.ctx());
        assert_eq!(reports[0].value.as_deref().unwrap(), "10");

        memory::write_scalar(&fx.space, &mut fx.memory, &Address::flat(0x1010), 0, 7, 4)
            .unwrap();
        let reports = displays.refresh(&mut fx.ctx());
        assert_eq!(reports[0].value.as_deref().unwrap(), "70");
    }
}
