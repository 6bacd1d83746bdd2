//! Render-and-blit driver.
//!
//! One shot, strictly in order:
//! 1. find the surface and fix its size,
//! 2. fetch + compile + instantiate the guest with the host environment as `"env"`,
//! 3. call `render`,
//! 4. view `width * height * 4` bytes at the returned offset as RGBA and put them at (0, 0).
//!
//! There is no re-render and guest memory is not watched afterwards. Every stage reports
//! failure as a [`DriverError`].

use log::info;

use crate::config::HostConfig;
use crate::environment::HostEnvironment;
use crate::loader::{self, LoadError};
use crate::runtime::{GuestRuntime, InstantiateError, LoadedModule, RenderError};
use crate::surface::{Canvas, Document, SurfaceError};


/// Errors from the render-and-blit sequence.
#[derive(Debug)]
pub enum DriverError {
    /// The document has no surface with the configured id.
    MissingSurface(String),
    /// The surface cannot take the configured size.
    Surface(SurfaceError),
    /// The wasm engine could not be created.
    Engine(anyhow::Error),
    Load(LoadError),
    Instantiate(InstantiateError),
    Render(RenderError),
}

impl core::fmt::Display for DriverError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DriverError::MissingSurface(id) => write!(f, "no drawing surface with id `{id}`"),
            DriverError::Surface(e) => write!(f, "{e}"),
            DriverError::Engine(e) => write!(f, "failed to create wasm engine: {e:#}"),
            DriverError::Load(e) => write!(f, "{e}"),
            DriverError::Instantiate(e) => write!(f, "{e}"),
            DriverError::Render(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Surface(e) => Some(e),
            DriverError::Load(e) => Some(e),
            DriverError::Instantiate(e) => Some(e),
            DriverError::Render(e) => Some(e),
            DriverError::MissingSurface(_) | DriverError::Engine(_) => None,
        }
    }
}

impl From<SurfaceError> for DriverError {
    fn from(e: SurfaceError) -> Self {
        DriverError::Surface(e)
    }
}

impl From<LoadError> for DriverError {
    fn from(e: LoadError) -> Self {
        DriverError::Load(e)
    }
}

impl From<InstantiateError> for DriverError {
    fn from(e: InstantiateError) -> Self {
        DriverError::Instantiate(e)
    }
}

impl From<RenderError> for DriverError {
    fn from(e: RenderError) -> Self {
        DriverError::Render(e)
    }
}

pub struct Driver {
    config: HostConfig,
    runtime: GuestRuntime,
}

impl Driver {
    pub fn new(config: HostConfig) -> Result<Self, DriverError> {
        let runtime = GuestRuntime::new().map_err(DriverError::Engine)?;
        Ok(Self { config, runtime })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Find the configured surface and fix its dimensions.
    pub fn prepare_surface<'d>(
        &self,
        document: &'d mut Document,
    ) -> Result<&'d mut Canvas, DriverError> {
        let canvas = self.surface(document)?;
        canvas.set_size(self.config.width, self.config.height)?;
        Ok(canvas)
    }

    /// Fetch the module from the configured path and instantiate it.
    pub fn load(&self, env: &HostEnvironment) -> Result<LoadedModule, DriverError> {
        info!("loading {}", self.config.module_path.display());
        let bytes = loader::fetch(&self.config.module_path)?;
        self.load_bytes(&bytes, env)
    }

    /// Instantiate a module from WASM or WAT bytes already in memory.
    pub fn load_bytes(
        &self,
        bytes: &[u8],
        env: &HostEnvironment,
    ) -> Result<LoadedModule, DriverError> {
        let module = self.runtime.compile(bytes)?;
        Ok(self.runtime.instantiate(&module, env)?)
    }

    /// Call `render` once and copy the returned buffer onto the surface.
    ///
    /// The image size is whatever the surface currently measures.
    pub fn render_and_blit(
        &self,
        loaded: &mut LoadedModule,
        document: &mut Document,
    ) -> Result<(), DriverError> {
        let canvas = self.surface(document)?;
        let (width, height) = (canvas.width(), canvas.height());

        let offset = loaded.render()?;
        let image = loaded.image_data(offset, width, height)?;
        canvas.put_image_data(&image, 0, 0);

        info!(
            "blitted {width}x{height} pixels from guest offset {offset:#x} ({} bytes)",
            image.data().len()
        );
        Ok(())
    }

    /// The whole sequence: prepare surface, load, render, blit.
    ///
    /// Returns the loaded module so the caller decides how long it lives.
    pub fn run(
        &self,
        env: &HostEnvironment,
        document: &mut Document,
    ) -> Result<LoadedModule, DriverError> {
        self.prepare_surface(document)?;
        let mut loaded = self.load(env)?;
        self.render_and_blit(&mut loaded, document)?;
        Ok(loaded)
    }

    fn surface<'d>(&self, document: &'d mut Document) -> Result<&'d mut Canvas, DriverError> {
        let id = &self.config.surface_id;
        document
            .get_element_by_id(id)
            .ok_or_else(|| DriverError::MissingSurface(id.clone()))
    }
}
