//! Drawing surfaces.
//!
//! - [`Canvas`]: an RGBA8 pixel surface with fixed dimensions.
//! - [`ImageData`]: a borrowed, row-major RGBA8 view (typically straight into guest memory).
//! - [`Document`]: named canvases, looked up by id.
//!
//! Writes replace pixels (no blending) and are clipped to the canvas, the same rules a
//! browser applies to `putImageData`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::abi::{self, BYTES_PER_PIXEL};

/// Size a freshly created canvas gets before anyone sets it.
pub const DEFAULT_CANVAS_WIDTH: u32 = 300;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 150;

/// Largest width or height a canvas accepts.
pub const MAX_CANVAS_DIMENSION: u32 = 32_767;
/// Largest pixel count a canvas accepts (16384 x 16384).
pub const MAX_CANVAS_AREA: u64 = 268_435_456;

/// Errors from surface operations.
#[derive(Debug)]
pub enum SurfaceError {
    /// Pixel data length is zero or not a multiple of `4 * width`.
    IndexSize { len: usize, width: u32 },
    /// Requested dimensions exceed the canvas limits.
    TooLarge { width: u32, height: u32 },
    /// PNG encoding failed.
    Encode(png::EncodingError),
    /// Output file could not be created or flushed.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl core::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SurfaceError::IndexSize { len, width } => write!(
                f,
                "{len} bytes is not a whole number of rows for an image {width} pixels wide"
            ),
            SurfaceError::TooLarge { width, height } => write!(
                f,
                "a {width}x{height} canvas exceeds the limit of {MAX_CANVAS_DIMENSION} pixels per side and {MAX_CANVAS_AREA} pixels in total"
            ),
            SurfaceError::Encode(e) => write!(f, "failed to encode PNG: {e}"),
            SurfaceError::Io { path, source } => {
                write!(f, "failed to write {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for SurfaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SurfaceError::Encode(e) => Some(e),
            SurfaceError::Io { source, .. } => Some(source),
            SurfaceError::IndexSize { .. } | SurfaceError::TooLarge { .. } => None,
        }
    }
}

impl From<png::EncodingError> for SurfaceError {
    fn from(e: png::EncodingError) -> Self {
        SurfaceError::Encode(e)
    }
}

/// Borrowed RGBA8 pixels, 4 bytes per pixel, row-major, no padding.
#[derive(Clone, Copy, Debug)]
pub struct ImageData<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> ImageData<'a> {
    /// Wrap `data` as an image `width` pixels wide; the height follows from the length.
    pub fn new(data: &'a [u8], width: u32) -> Result<Self, SurfaceError> {
        let row = (width as usize).saturating_mul(BYTES_PER_PIXEL);
        if row == 0 || data.is_empty() || data.len() % row != 0 {
            return Err(SurfaceError::IndexSize {
                len: data.len(),
                width,
            });
        }
        let height = u32::try_from(data.len() / row).map_err(|_| SurfaceError::IndexSize {
            len: data.len(),
            width,
        })?;
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn row(&self, y: usize) -> &'a [u8] {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        &self.data[y * stride..(y + 1) * stride]
    }
}

/// RGBA8 drawing surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Default for Canvas {
    fn default() -> Self {
        let (width, height) = (DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT);
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }
}

impl Canvas {
    /// A transparent black canvas.
    ///
    /// Fails with [`SurfaceError::TooLarge`] past [`MAX_CANVAS_DIMENSION`] per side or
    /// [`MAX_CANVAS_AREA`] pixels, before anything is allocated.
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        let too_large = || SurfaceError::TooLarge { width, height };
        if width > MAX_CANVAS_DIMENSION
            || height > MAX_CANVAS_DIMENSION
            || u64::from(width) * u64::from(height) > MAX_CANVAS_AREA
        {
            return Err(too_large());
        }
        let len = abi::image_byte_len(width, height).ok_or_else(too_large)?;
        Ok(Self {
            width,
            height,
            pixels: vec![0; len],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resize; like a browser canvas, this also clears it.
    ///
    /// On error the canvas is left as it was.
    pub fn set_size(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        *self = Self::new(width, height)?;
        Ok(())
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA at (x, y), if inside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let p = &self.pixels[i..i + BYTES_PER_PIXEL];
        Some([p[0], p[1], p[2], p[3]])
    }

    /// Copy `image` with its top-left corner at (dx, dy), replacing what is there.
    ///
    /// Parts that fall outside the canvas are dropped.
    pub fn put_image_data(&mut self, image: &ImageData<'_>, dx: i32, dy: i32) {
        let screen_w = self.width as i64;
        let screen_h = self.height as i64;
        let (dx, dy) = (dx as i64, dy as i64);

        let x_start = dx.max(0);
        let y_start = dy.max(0);
        let x_end = (dx + image.width() as i64).min(screen_w);
        let y_end = (dy + image.height() as i64).min(screen_h);
        if x_start >= x_end || y_start >= y_end {
            return;
        }

        let span = (x_end - x_start) as usize * BYTES_PER_PIXEL;
        let src_x = (x_start - dx) as usize * BYTES_PER_PIXEL;
        for curr_y in y_start..y_end {
            let src = &image.row((curr_y - dy) as usize)[src_x..src_x + span];
            let dst_start = (curr_y as usize * self.width as usize + x_start as usize)
                * BYTES_PER_PIXEL;
            self.pixels[dst_start..dst_start + span].copy_from_slice(src);
        }
    }

    /// Encode as an 8-bit RGBA PNG.
    pub fn encode_png<W: Write>(&self, out: W) -> Result<(), SurfaceError> {
        let mut encoder = png::Encoder::new(out, self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.pixels)?;
        writer.finish()?;
        Ok(())
    }

    /// Encode as PNG into the file at `path`.
    pub fn write_png(&self, path: &Path) -> Result<(), SurfaceError> {
        let io_err = |source| SurfaceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut out = BufWriter::new(file);
        self.encode_png(&mut out)?;
        out.flush().map_err(io_err)?;
        debug!(
            "wrote {}x{} canvas to {}",
            self.width,
            self.height,
            path.display()
        );
        Ok(())
    }
}

/// Named canvases.
#[derive(Clone, Debug, Default)]
pub struct Document {
    elements: BTreeMap<String, Canvas>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document holding one default-sized canvas under `id`.
    pub fn with_canvas(id: impl Into<String>) -> Self {
        let mut doc = Self::new();
        doc.insert(id, Canvas::default());
        doc
    }

    /// Add or replace the canvas under `id`, returning the previous one.
    pub fn insert(&mut self, id: impl Into<String>, canvas: Canvas) -> Option<Canvas> {
        self.elements.insert(id.into(), canvas)
    }

    pub fn get_element_by_id(&mut self, id: &str) -> Option<&mut Canvas> {
        self.elements.get_mut(id)
    }

    pub fn get(&self, id: &str) -> Option<&Canvas> {
        self.elements.get(id)
    }
}
