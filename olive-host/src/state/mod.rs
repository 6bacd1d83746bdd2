//! Per-store host state.
//!
//! Every `Store` created by the runtime carries a [`HostState`]. Host functions reach it
//! through `Caller::data_mut`, so there is no process-wide state: the store (and therefore
//! the state) is owned by the [`crate::runtime::LoadedModule`] it belongs to.

use core::fmt;

use wasmtime::Val;

/// Data attached to a guest store.
#[derive(Debug, Default)]
pub struct HostState {
    /// Calls that landed in a stand-in, in call order.
    pub diagnostics: Vec<Diagnostic>,
}

impl HostState {
    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// A call into an import nobody provided.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub name: String,
    pub args: Vec<GuestValue>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NOT IMPLEMENTED: {} [", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str("]")
    }
}

/// Printable copy of a wasm value.
///
/// `wasmtime::Val` is tied to a store for reference types, so diagnostics keep only what
/// can be shown.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GuestValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    V128(u128),
    Ref { null: bool },
}

impl From<&Val> for GuestValue {
    fn from(val: &Val) -> Self {
        match val {
            Val::I32(v) => GuestValue::I32(*v),
            Val::I64(v) => GuestValue::I64(*v),
            Val::F32(bits) => GuestValue::F32(f32::from_bits(*bits)),
            Val::F64(bits) => GuestValue::F64(f64::from_bits(*bits)),
            Val::V128(v) => GuestValue::V128(v.as_u128()),
            Val::FuncRef(r) => GuestValue::Ref { null: r.is_none() },
            Val::ExternRef(r) => GuestValue::Ref { null: r.is_none() },
            _ => GuestValue::Ref { null: false },
        }
    }
}

impl fmt::Display for GuestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestValue::I32(v) => write!(f, "{v}"),
            GuestValue::I64(v) => write!(f, "{v}"),
            GuestValue::F32(v) => write!(f, "{v}"),
            GuestValue::F64(v) => write!(f, "{v}"),
            GuestValue::V128(v) => write!(f, "{v:#034x}"),
            GuestValue::Ref { null: true } => f.write_str("null"),
            GuestValue::Ref { null: false } => f.write_str("<ref>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_lists_name_and_arguments() {
        let d = Diagnostic {
            name: "log_value".to_string(),
            args: vec![GuestValue::I32(42), GuestValue::F32(0.5)],
        };
        assert_eq!(d.to_string(), "NOT IMPLEMENTED: log_value [42, 0.5]");
    }

    #[test]
    fn diagnostic_without_arguments() {
        let d = Diagnostic {
            name: "tick".to_string(),
            args: Vec::new(),
        };
        assert_eq!(d.to_string(), "NOT IMPLEMENTED: tick []");
    }

    #[test]
    fn vals_convert_to_printable_values() {
        assert_eq!(GuestValue::from(&Val::I32(-1)), GuestValue::I32(-1));
        assert_eq!(GuestValue::from(&Val::I64(7)), GuestValue::I64(7));
        assert_eq!(
            GuestValue::from(&Val::F64(2.5f64.to_bits())),
            GuestValue::F64(2.5)
        );
        assert_eq!(
            GuestValue::from(&Val::FuncRef(None)),
            GuestValue::Ref { null: true }
        );
    }
}
