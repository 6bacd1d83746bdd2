//! olive-host: loads a guest WASM/WAT module, calls its `render` export once and blits the
//! returned RGBA buffer onto a canvas.
//!
//! Required guest exports:
//! - `memory`
//! - `render() -> i32` (byte offset of a `width * height * 4` RGBA8 buffer)
//!
//! Guest imports under `"env"` are resolved by name through a
//! [`HostEnvironment`](environment::HostEnvironment); anything not provided becomes a
//! stand-in that logs the call and returns zero.
//!
//! ```no_run
//! use olive_host::{Driver, Document, HostConfig, HostEnvironment};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = HostConfig::default();
//! let mut document = Document::with_canvas(config.surface_id.clone());
//! let driver = Driver::new(config)?;
//! let _loaded = driver.run(&HostEnvironment::empty(), &mut document)?;
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod config;
pub mod driver;
pub mod environment;
pub mod loader;
pub mod runtime;
pub mod state;
pub mod surface;

pub use config::HostConfig;
pub use driver::{Driver, DriverError};
pub use environment::{Callable, HostEnvironment, HostTable, StandIn};
pub use runtime::LoadedModule;
pub use surface::{Canvas, Document, ImageData};
