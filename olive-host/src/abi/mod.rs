//! olive-host ABI module
//!
//! This module defines the contract between:
//! - **Host**: `olive-host` (loads the module, owns the canvas)
//! - **Guest**: the loaded WASM module that produces pixels
//!
//! ## Model (render-and-blit)
//! The guest owns a pixel buffer somewhere in its own linear memory. The host calls
//! `render()` exactly once; the guest fills the buffer and returns its offset. The host then
//! reads `width * height * 4` bytes from that offset (RGBA8, row-major, no padding) and
//! copies them onto the canvas at (0, 0).
//!
//! ## Imports (guest -> host)
//! Imported from module `"env"`. The host does not define a fixed import list: every
//! function the guest asks for is resolved by name through a [`crate::environment::HostEnvironment`].
//! Names nobody provides are bound to a logging stand-in.
//!
//! ## Exports (host -> guest) required
//! - `memory`: the guest linear memory.
//! - `render() -> i32`: returns the byte offset of the pixel buffer. A 64-bit offset
//!   (`i64`) is accepted for memory64 guests.

use wasmtime::{Func, Instance, Memory, Store};

/// Import module name used by the guest.
pub const IMPORT_MODULE: &str = "env";

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Canvas width used when nothing overrides it.
pub const DEFAULT_WIDTH: u32 = 800;

/// Canvas height used when nothing overrides it.
pub const DEFAULT_HEIGHT: u32 = 600;

/// Where the guest module is fetched from.
pub const DEFAULT_MODULE_PATH: &str = "./wasm.wasm";

/// Identifier of the drawing surface inside the [`crate::surface::Document`].
pub const SURFACE_ID: &str = "app";

/// File the canvas is written to once rendering completes.
pub const DEFAULT_OUTPUT_PATH: &str = "app.png";

/// Guest export names.
pub mod guest_exports {
    /// Called once; returns the pixel buffer offset (required).
    pub const RENDER: &str = "render";
    /// Guest linear memory (required).
    pub const MEMORY: &str = "memory";
}

/// Number of bytes an RGBA8 image of `width x height` occupies, or `None` on overflow.
pub fn image_byte_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// Export validation results.
pub mod validate {
    use super::guest_exports;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MissingExport {
        Render,
        Memory,
    }

    impl core::fmt::Display for MissingExport {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            match self {
                MissingExport::Render => {
                    write!(f, "guest does not export a `{}` function", guest_exports::RENDER)
                }
                MissingExport::Memory => {
                    write!(f, "guest does not export `{}`", guest_exports::MEMORY)
                }
            }
        }
    }

    impl std::error::Error for MissingExport {}
}

/// The guest's entrypoints, resolved once after instantiation.
///
/// Resolving them is also how an instance is validated: both exports are required.
#[derive(Clone, Copy)]
pub struct GuestEntrypoints {
    pub render: Func,
    pub memory: Memory,
}

impl GuestEntrypoints {
    /// Resolve entrypoint exports from an instance.
    pub fn resolve(
        instance: &Instance,
        store: &mut Store<crate::state::HostState>,
    ) -> Result<Self, validate::MissingExport> {
        let render = instance
            .get_func(&mut *store, guest_exports::RENDER)
            .ok_or(validate::MissingExport::Render)?;
        let memory = instance
            .get_memory(&mut *store, guest_exports::MEMORY)
            .ok_or(validate::MissingExport::Memory)?;

        Ok(Self { render, memory })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_canvas_needs_exactly_1_920_000_bytes() {
        assert_eq!(
            image_byte_len(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            Some(1_920_000)
        );
    }

    #[test]
    fn image_byte_len_reports_overflow() {
        assert_eq!(image_byte_len(u32::MAX, u32::MAX), None);
        assert_eq!(image_byte_len(0, DEFAULT_HEIGHT), Some(0));
    }
}
