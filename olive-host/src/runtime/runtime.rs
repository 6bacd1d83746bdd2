//! Wasmtime-backed runtime glue for olive-host.
//!
//! Responsibilities:
//! - Create a Wasmtime `Engine` with the feature flags guests commonly need.
//! - Resolve every import the module declares under `"env"` through a [`HostEnvironment`].
//! - Instantiate a compiled `wasmtime::Module` into an owned [`LoadedModule`].
//!
//! The loaded module owns its `Store`, so guest memory and host state live exactly as long
//! as the handle does.

use log::{debug, info};
use wasmtime::{Engine, Instance, Module, Store, Val, ValType};

use crate::abi::{self, GuestEntrypoints, guest_exports, validate::MissingExport};
use crate::environment::{self, HostEnvironment, ImportError, LinkReport};
use crate::loader::{self, LoadError};
use crate::state::{Diagnostic, HostState};
use crate::surface::{ImageData, SurfaceError};

/// Errors from turning a compiled module into a running instance.
#[derive(Debug)]
pub enum InstantiateError {
    Import(ImportError),
    /// Wasmtime rejected the instance (start function trapped, limits exceeded, ...).
    Instantiate(anyhow::Error),
    MissingExport(MissingExport),
}

impl core::fmt::Display for InstantiateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InstantiateError::Import(e) => write!(f, "{e}"),
            InstantiateError::Instantiate(e) => write!(f, "failed to instantiate module: {e:#}"),
            InstantiateError::MissingExport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for InstantiateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InstantiateError::Import(e) => Some(e),
            InstantiateError::MissingExport(e) => Some(e),
            InstantiateError::Instantiate(_) => None,
        }
    }
}

/// Errors from calling `render` and reading its pixels.
#[derive(Debug)]
pub enum RenderError {
    /// `render` does not return an `i32`/`i64` offset, or takes a parameter we cannot fill.
    BadSignature(String),
    /// The guest trapped inside `render` (including stand-ins that could not return).
    Trap(anyhow::Error),
    /// The pixel region does not fit in guest memory.
    OutOfBounds {
        offset: u64,
        len: usize,
        memory_len: usize,
    },
    Image(SurfaceError),
}

impl core::fmt::Display for RenderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RenderError::BadSignature(sig) => write!(
                f,
                "`{}` has signature {sig}; expected a function returning an i32 offset",
                guest_exports::RENDER
            ),
            RenderError::Trap(e) => {
                write!(f, "guest trapped in `{}`: {e:#}", guest_exports::RENDER)
            }
            RenderError::OutOfBounds {
                offset,
                len,
                memory_len,
            } => write!(
                f,
                "pixel buffer at offset {offset} ({len} bytes) exceeds guest memory of {memory_len} bytes"
            ),
            RenderError::Image(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Image(e) => Some(e),
            _ => None,
        }
    }
}

/// Host-side runtime container.
pub struct GuestRuntime {
    engine: Engine,
}

impl GuestRuntime {
    /// Create a new Wasmtime runtime.
    ///
    /// C toolchains targeting wasm32 commonly emit bulk-memory and multi-value code, so those
    /// are enabled explicitly along with SIMD and reference types.
    pub fn new() -> Result<Self, anyhow::Error> {
        let mut cfg = wasmtime::Config::new();

        cfg.wasm_multi_value(true);
        cfg.wasm_bulk_memory(true);
        cfg.wasm_reference_types(true);
        cfg.wasm_simd(true);
        cfg.wasm_memory64(true);

        let engine = Engine::new(&cfg)?;
        Ok(Self { engine })
    }

    /// Compile WASM or WAT bytes for this runtime's engine.
    pub fn compile(&self, bytes: &[u8]) -> Result<Module, LoadError> {
        loader::compile_module(&self.engine, bytes)
    }

    /// Link `env` against the module's imports, instantiate, and resolve entrypoints.
    pub fn instantiate(
        &self,
        module: &Module,
        env: &HostEnvironment,
    ) -> Result<LoadedModule, InstantiateError> {
        let mut store = Store::new(&self.engine, HostState::default());

        let (imports, report) =
            environment::link(env, &mut store, module).map_err(InstantiateError::Import)?;
        if !report.stand_ins.is_empty() {
            info!(
                "no host definition for {} import(s): {}",
                report.stand_ins.len(),
                report.stand_ins.join(", ")
            );
        }

        let instance = Instance::new(&mut store, module, &imports)
            .map_err(InstantiateError::Instantiate)?;

        let entrypoints = GuestEntrypoints::resolve(&instance, &mut store)
            .map_err(InstantiateError::MissingExport)?;

        debug!(
            "instantiated module; memory is {} bytes",
            entrypoints.memory.data_size(&store)
        );

        Ok(LoadedModule {
            store,
            entrypoints,
            report,
        })
    }
}

/// An instantiated guest and everything it owns.
pub struct LoadedModule {
    store: Store<HostState>,
    entrypoints: GuestEntrypoints,
    report: LinkReport,
}

impl LoadedModule {
    /// Call `render` and return the offset of the pixel buffer.
    ///
    /// Parameters, if the guest declares any, are passed as zero values.
    pub fn render(&mut self) -> Result<u64, RenderError> {
        let render = self.entrypoints.render;
        let ty = render.ty(&self.store);
        let bad_signature = || RenderError::BadSignature(format!("{ty:?}"));

        match ty.results().next() {
            Some(ValType::I32 | ValType::I64) => {}
            _ => return Err(bad_signature()),
        }

        let params = ty
            .params()
            .map(|p| Val::default_for_ty(&p))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(bad_signature)?;
        let mut results = ty
            .results()
            .map(|r| Val::default_for_ty(&r).unwrap_or(Val::I32(0)))
            .collect::<Vec<_>>();

        render
            .call(&mut self.store, &params, &mut results)
            .map_err(RenderError::Trap)?;

        match results[0] {
            // Guest pointers are unsigned.
            Val::I32(offset) => Ok(offset as u32 as u64),
            Val::I64(offset) => Ok(offset as u64),
            _ => Err(bad_signature()),
        }
    }

    /// The guest's linear memory as it is right now.
    pub fn memory(&self) -> &[u8] {
        self.entrypoints.memory.data(&self.store)
    }

    /// Borrow `width * height * 4` bytes at `offset` as an image.
    pub fn image_data(
        &self,
        offset: u64,
        width: u32,
        height: u32,
    ) -> Result<ImageData<'_>, RenderError> {
        let memory = self.memory();
        let len = abi::image_byte_len(width, height).unwrap_or(usize::MAX);
        let out_of_bounds = || RenderError::OutOfBounds {
            offset,
            len,
            memory_len: memory.len(),
        };

        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
        let bytes = memory.get(start..end).ok_or_else(out_of_bounds)?;

        ImageData::new(bytes, width).map_err(RenderError::Image)
    }

    /// Calls that reached a stand-in so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.store.data().diagnostics
    }

    pub fn link_report(&self) -> &LinkReport {
        &self.report
    }
}
