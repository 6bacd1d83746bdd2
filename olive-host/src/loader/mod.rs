//! Loader utilities for olive-host.
//!
//! Responsibilities:
//! - Fetch the module bytes from disk.
//! - Detect whether the bytes are a `.wasm` binary or `.wat` text.
//! - If it looks like WAT, convert it to WASM bytes (via the `wat` crate).
//! - Compile a Wasmtime `Module` from the resulting WASM bytes.
//!
//! Notes:
//! - The path is fixed by configuration and may point at either format, so we sniff the
//!   bytes themselves instead of trusting the extension.
//! - We accept leading whitespace and a UTF-8 BOM before WAT.

use std::path::{Path, PathBuf};

use log::debug;
use wasmtime::{Engine, Module};

/// Error returned by loader helpers.
#[derive(Debug)]
pub enum LoadError {
    /// The module file could not be read.
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The input was empty or otherwise not recognized as WASM/WAT.
    UnrecognizedFormat,
    /// WAT parsing failed.
    WatParseFailed(wat::Error),
    /// Wasmtime module compilation failed.
    CompileFailed(anyhow::Error),
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LoadError::ReadFailed { path, source } => {
                write!(f, "failed to read module {}: {source}", path.display())
            }
            LoadError::UnrecognizedFormat => {
                write!(f, "unrecognized module format (expected wasm or wat)")
            }
            LoadError::WatParseFailed(e) => write!(f, "failed to parse WAT: {e}"),
            LoadError::CompileFailed(e) => write!(f, "failed to compile WASM module: {e:#}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::ReadFailed { source, .. } => Some(source),
            LoadError::WatParseFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// What kind of module the loader inferred from the bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectedFormat {
    Wasm,
    Wat,
}

/// Read the module bytes from `path`.
pub fn fetch(path: &Path) -> Result<Vec<u8>, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("fetched {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

/// Load: detect -> (optional) wat->wasm -> compile.
pub fn compile_module(engine: &Engine, bytes: &[u8]) -> Result<Module, LoadError> {
    let Detected { format, wasm_bytes } = normalize_to_wasm(bytes)?;
    debug!("compiling {format:?} module ({} wasm bytes)", wasm_bytes.len());
    Module::new(engine, wasm_bytes.as_slice()).map_err(LoadError::CompileFailed)
}

/// Detect format and normalize to valid WASM bytes.
pub fn normalize_to_wasm(bytes: &[u8]) -> Result<Detected, LoadError> {
    let format = detect_format(bytes).ok_or(LoadError::UnrecognizedFormat)?;

    match format {
        DetectedFormat::Wasm => Ok(Detected {
            format,
            wasm_bytes: bytes.to_vec(),
        }),
        DetectedFormat::Wat => {
            let wasm_bytes = wat::parse_bytes(bytes)
                .map_err(LoadError::WatParseFailed)?
                .into_owned();
            Ok(Detected { format, wasm_bytes })
        }
    }
}

/// Result of normalizing (detecting + possibly converting) the input.
#[derive(Clone, Debug)]
pub struct Detected {
    pub format: DetectedFormat,
    /// Always valid WASM bytes (for WASM/WAT inputs).
    pub wasm_bytes: Vec<u8>,
}

/// Best-effort detection.
///
/// Rules:
/// - If the first 4 bytes are `\0asm`, treat as WASM.
/// - Else, after stripping UTF-8 BOM / leading whitespace, if the first non-ws byte is `(`,
///   treat as WAT (common WAT starts with `(module ...)`).
///
/// This avoids requiring valid UTF-8 for WAT; `wat::parse_bytes` accepts bytes.
pub fn detect_format(bytes: &[u8]) -> Option<DetectedFormat> {
    if bytes.starts_with(b"\0asm") {
        return Some(DetectedFormat::Wasm);
    }

    let text = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match text.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'(') => Some(DetectedFormat::Wat),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_wasm_magic() {
        assert_eq!(
            detect_format(b"\0asm\x01\x00\x00\x00"),
            Some(DetectedFormat::Wasm)
        );
    }

    #[test]
    fn detects_wat_with_whitespace() {
        assert_eq!(detect_format(b"   \n\t(module)"), Some(DetectedFormat::Wat));
    }

    #[test]
    fn detects_wat_with_bom() {
        assert_eq!(
            detect_format(b"\xEF\xBB\xBF(module)"),
            Some(DetectedFormat::Wat)
        );
    }

    #[test]
    fn unrecognized_returns_none() {
        assert_eq!(detect_format(b"not wasm"), None);
        assert_eq!(detect_format(b""), None);
    }

    #[test]
    fn wat_is_normalized_to_wasm_magic() {
        let detected = normalize_to_wasm(b"(module)").unwrap();
        assert_eq!(detected.format, DetectedFormat::Wat);
        assert!(detected.wasm_bytes.starts_with(b"\0asm"));
    }

    #[test]
    fn compile_rejects_garbage() {
        let engine = Engine::default();
        assert!(matches!(
            compile_module(&engine, b"garbage"),
            Err(LoadError::UnrecognizedFormat)
        ));
        assert!(matches!(
            compile_module(&engine, b"(module (func $broken (result i32)))"),
            Err(LoadError::CompileFailed(_))
        ));
    }

    #[test]
    fn fetch_reports_missing_file() {
        let err = fetch(Path::new("./definitely/not/here.wasm")).unwrap_err();
        assert!(matches!(err, LoadError::ReadFailed { .. }));
        assert!(err.to_string().contains("not/here.wasm"));
    }
}
