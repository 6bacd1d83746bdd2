//! Host environment shim.
//!
//! A guest may import any number of host functions under `"env"`, and only the guest knows
//! which. Instead of enumerating names up front, the host walks the module's import table at
//! link time and asks a [`HostEnvironment`] to [`resolve`](HostEnvironment::resolve) each
//! name:
//!
//! - source tables are searched in priority order, first definition wins;
//! - a name no table defines resolves to a [`StandIn`], which logs the call and returns
//!   zero values.
//!
//! Resolution never fails. A guest that depends on a missing import only notices when the
//! stand-in is actually called and hands back nothing useful.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use wasmtime::{Caller, Extern, ExternType, Func, Module, Store, Val, ValType};

use crate::abi::IMPORT_MODULE;
use crate::state::{Diagnostic, GuestValue, HostState};

/// A dynamically typed host function.
///
/// The signature matches `wasmtime::Func::new`, so one closure can serve whatever
/// signature the guest declared for the import.
pub type HostFunction =
    Arc<dyn Fn(Caller<'_, HostState>, &[Val], &mut [Val]) -> anyhow::Result<()> + Send + Sync>;

/// One source of named host functions.
#[derive(Clone, Default)]
pub struct HostTable {
    entries: HashMap<String, HostFunction>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or replace) `name` in this table.
    pub fn define<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(Caller<'_, HostState>, &[Val], &mut [Val]) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.entries.insert(name.into(), Arc::new(func));
        self
    }

    /// Builder form of [`define`](Self::define).
    pub fn with<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Caller<'_, HostState>, &[Val], &mut [Val]) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.define(name, func);
        self
    }

    /// The function this table itself defines for `name`.
    pub fn get(&self, name: &str) -> Option<&HostFunction> {
        self.entries.get(name)
    }
}

impl core::fmt::Debug for HostTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HostTable").field("names", &names).finish()
    }
}

/// Ordered list of [`HostTable`]s with a stand-in fallback.
#[derive(Clone, Debug, Default)]
pub struct HostEnvironment {
    tables: Vec<HostTable>,
}

impl HostEnvironment {
    /// Tables are consulted in the order given.
    pub fn new(tables: impl IntoIterator<Item = HostTable>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
        }
    }

    /// No tables: every import resolves to a stand-in.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve an import name. Never fails.
    pub fn resolve(&self, name: &str) -> Callable {
        self.tables
            .iter()
            .find_map(|table| table.get(name))
            .map(|func| Callable::Provided(Arc::clone(func)))
            .unwrap_or_else(|| Callable::StandIn(StandIn::new(name)))
    }
}

/// What an import name resolved to.
#[derive(Clone)]
pub enum Callable {
    Provided(HostFunction),
    StandIn(StandIn),
}

impl Callable {
    pub fn is_stand_in(&self) -> bool {
        matches!(self, Callable::StandIn(_))
    }
}

impl core::fmt::Debug for Callable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Callable::Provided(_) => f.write_str("Provided(..)"),
            Callable::StandIn(s) => f.debug_tuple("StandIn").field(&s.name).finish(),
        }
    }
}

/// Substitute for an import nobody provided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StandIn {
    name: String,
}

impl StandIn {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Log the call and record it on the store state.
    pub fn invoke(&self, state: &mut HostState, args: &[Val]) {
        let diagnostic = Diagnostic {
            name: self.name.clone(),
            args: args.iter().map(GuestValue::from).collect(),
        };
        warn!("{diagnostic}");
        state.record(diagnostic);
    }

    /// Write the zero value of each declared result type.
    ///
    /// Fails (trapping the guest) only for result types without a default, i.e.
    /// non-nullable references.
    pub fn fill_results(
        &self,
        result_types: &[ValType],
        results: &mut [Val],
    ) -> anyhow::Result<()> {
        for (slot, ty) in results.iter_mut().zip(result_types) {
            *slot = Val::default_for_ty(ty).ok_or_else(|| {
                anyhow::anyhow!(
                    "stand-in for `{}` cannot produce a value of type {ty:?}",
                    self.name
                )
            })?;
        }
        Ok(())
    }
}

/// Errors from binding a module's imports.
#[derive(Debug)]
pub enum ImportError {
    /// The import lives outside the `"env"` namespace.
    UnknownModule { module: String, name: String },
    /// Only functions can be synthesized; memories, tables and globals cannot.
    NotAFunction { name: String, kind: &'static str },
}

impl core::fmt::Display for ImportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ImportError::UnknownModule { module, name } => write!(
                f,
                "import `{module}::{name}` is outside the `{IMPORT_MODULE}` namespace"
            ),
            ImportError::NotAFunction { name, kind } => write!(
                f,
                "import `{IMPORT_MODULE}::{name}` is a {kind}; only functions can be provided"
            ),
        }
    }
}

impl std::error::Error for ImportError {}

/// Which imports were bound to what.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub provided: Vec<String>,
    pub stand_ins: Vec<String>,
}

/// Build one host function per import of `module`, in import order, resolved through
/// `env`.
///
/// Each import gets its own `Func` carrying the signature that import declares, so a name
/// imported twice with different signatures is satisfied twice.
pub fn link(
    env: &HostEnvironment,
    store: &mut Store<HostState>,
    module: &Module,
) -> Result<(Vec<Extern>, LinkReport), ImportError> {
    let mut report = LinkReport::default();
    let mut externs = Vec::new();

    for import in module.imports() {
        let name = import.name();
        if import.module() != IMPORT_MODULE {
            return Err(ImportError::UnknownModule {
                module: import.module().to_string(),
                name: name.to_string(),
            });
        }

        let ty = match import.ty() {
            ExternType::Func(ty) => ty,
            other => {
                return Err(ImportError::NotAFunction {
                    name: name.to_string(),
                    kind: extern_kind(&other),
                });
            }
        };

        let func = match env.resolve(name) {
            Callable::Provided(func) => {
                report.provided.push(name.to_string());
                Func::new(&mut *store, ty, move |caller, params, results| {
                    func(caller, params, results)
                })
            }
            Callable::StandIn(stand_in) => {
                report.stand_ins.push(name.to_string());
                let result_types: Vec<ValType> = ty.results().collect();
                Func::new(&mut *store, ty, move |mut caller, params, results| {
                    stand_in.invoke(caller.data_mut(), params);
                    stand_in.fill_results(&result_types, results)
                })
            }
        };
        externs.push(Extern::Func(func));
    }

    debug!(
        "linked {} provided and {} stand-in imports",
        report.provided.len(),
        report.stand_ins.len()
    );
    Ok((externs, report))
}

fn extern_kind(ty: &ExternType) -> &'static str {
    match ty {
        ExternType::Func(_) => "function",
        ExternType::Global(_) => "global",
        ExternType::Table(_) => "table",
        ExternType::Memory(_) => "memory",
        #[allow(unreachable_patterns)]
        _ => "tag",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, Once};
    use wasmtime::{HeapType, RefType};

    /// Collects every log record emitted in this test binary.
    struct CapturedLogs(Mutex<Vec<(log::Level, String)>>);

    impl log::Log for CapturedLogs {
        fn enabled(&self, _: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            self.0
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    static LOGS: CapturedLogs = CapturedLogs(Mutex::new(Vec::new()));

    fn captured_logs() -> &'static CapturedLogs {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            log::set_logger(&LOGS).expect("no other logger in unit tests");
            log::set_max_level(log::LevelFilter::Trace);
        });
        &LOGS
    }

    fn noop(_: Caller<'_, HostState>, _: &[Val], _: &mut [Val]) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn empty_environment_resolves_everything_to_stand_ins() {
        let env = HostEnvironment::empty();
        for name in ["log_value", "sinf", "memcpy", ""] {
            match env.resolve(name) {
                Callable::StandIn(s) => assert_eq!(s.name(), name),
                Callable::Provided(_) => panic!("`{name}` should not be provided"),
            }
        }
    }

    #[test]
    fn first_table_wins() {
        let first = HostTable::new().with("shared", noop).with("only_first", noop);
        let second = HostTable::new().with("shared", noop).with("only_second", noop);
        let env = HostEnvironment::new([first.clone(), second.clone()]);

        let Callable::Provided(shared) = env.resolve("shared") else {
            panic!("`shared` should be provided");
        };
        assert!(Arc::ptr_eq(&shared, first.get("shared").unwrap()));
        assert!(!Arc::ptr_eq(&shared, second.get("shared").unwrap()));

        let Callable::Provided(only_second) = env.resolve("only_second") else {
            panic!("`only_second` should be provided");
        };
        assert!(Arc::ptr_eq(&only_second, second.get("only_second").unwrap()));

        assert!(env.resolve("nobody").is_stand_in());
    }

    #[test]
    fn lookups_are_exact_names() {
        let env = HostEnvironment::new([HostTable::new().with("log", noop)]);
        assert!(!env.resolve("log").is_stand_in());
        assert!(env.resolve("log_value").is_stand_in());
        assert!(env.resolve("LOG").is_stand_in());
    }

    #[test]
    fn stand_in_records_name_and_arguments() {
        let mut state = HostState::default();
        let stand_in = StandIn::new("log_value");

        stand_in.invoke(&mut state, &[Val::I32(42)]);
        stand_in.invoke(&mut state, &[]);

        assert_eq!(state.diagnostics.len(), 2);
        assert_eq!(state.diagnostics[0].name, "log_value");
        assert_eq!(state.diagnostics[0].args, vec![GuestValue::I32(42)]);
        assert!(state.diagnostics[0].to_string().contains("42"));
        assert!(state.diagnostics[1].args.is_empty());
    }

    #[test]
    fn stand_in_results_are_zero_values() {
        let stand_in = StandIn::new("get");
        let types = [ValType::I32, ValType::I64, ValType::F32, ValType::F64];
        let mut results = vec![Val::I32(9), Val::I32(9), Val::I32(9), Val::I32(9)];

        stand_in.fill_results(&types, &mut results).unwrap();

        assert_eq!(results[0].i32(), Some(0));
        assert_eq!(results[1].i64(), Some(0));
        assert_eq!(results[2].f32(), Some(0.0));
        assert_eq!(results[3].f64(), Some(0.0));
    }

    #[test]
    fn stand_in_cannot_invent_non_nullable_references() {
        let stand_in = StandIn::new("make_ref");
        let types = [ValType::Ref(RefType::new(false, HeapType::Func))];
        let mut results = vec![Val::I32(0)];

        let err = stand_in.fill_results(&types, &mut results).unwrap_err();
        assert!(err.to_string().contains("make_ref"));
    }

    #[test]
    fn stand_in_emits_one_warning_per_call() {
        let logs = captured_logs();
        let mut state = HostState::default();

        StandIn::new("warned_import").invoke(&mut state, &[Val::I32(7), Val::I64(-1)]);

        let warnings: Vec<_> = logs
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, msg)| msg.contains("warned_import"))
            .cloned()
            .collect();
        assert_eq!(
            warnings,
            vec![(
                log::Level::Warn,
                "NOT IMPLEMENTED: warned_import [7, -1]".to_string()
            )]
        );
        assert_eq!(warnings[0].1, state.diagnostics[0].to_string());
    }
}
