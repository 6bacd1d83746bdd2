//! Host configuration.

use std::path::PathBuf;

use crate::abi;

/// Everything the driver needs to know up front.
///
/// `Default` reproduces the fixed setup: `./wasm.wasm` rendered at 800x600 onto the `app`
/// surface, saved to `app.png`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostConfig {
    pub module_path: PathBuf,
    pub surface_id: String,
    pub width: u32,
    pub height: u32,
    pub output_path: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            module_path: PathBuf::from(abi::DEFAULT_MODULE_PATH),
            surface_id: abi::SURFACE_ID.to_string(),
            width: abi::DEFAULT_WIDTH,
            height: abi::DEFAULT_HEIGHT,
            output_path: PathBuf::from(abi::DEFAULT_OUTPUT_PATH),
        }
    }
}
