//! Wasmtime-backed runtime glue for olive-host.
//!
//! Responsibilities:
//! - Create a Wasmtime `Engine`.
//! - Link the host environment under module `"env"`.
//! - Instantiate a compiled `wasmtime::Module` into an owned [`LoadedModule`].
//! - Call `render` and expose its pixel buffer.
//!
//! Import resolution itself lives in `crate::environment`.

pub mod runtime;

pub use runtime::{GuestRuntime, InstantiateError, LoadedModule, RenderError};
