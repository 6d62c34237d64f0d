//! Driver registry.
//!
//! Holds the installed drivers in probe priority order and tracks which one owns
//! the current session.

use std::path::Path;

use crate::drivers::aa3::{Aa3Format, DecoderFactory};
use crate::drivers::block::BlockFormat;
use crate::drivers::{DriverContext, MusicDriver, StreamingDriver};
use crate::error::{DriverError, Result};

/// Ordered set of format drivers.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Vec<Box<dyn MusicDriver>>,
    active: Option<usize>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the built-in drivers: `aa3` first, then `block`.
    ///
    /// `decoders` supplies the coprocessor for `aa3`; `None` renders silence.
    pub fn with_defaults(ctx: DriverContext, decoders: Option<DecoderFactory>) -> Self {
        let aa3 = match decoders {
            Some(f) => Aa3Format::new(f),
            None => Aa3Format::without_coprocessor(),
        };
        let mut registry = Self::new();
        registry.register(Box::new(StreamingDriver::new(aa3, ctx.clone())));
        registry.register(Box::new(StreamingDriver::new(BlockFormat, ctx)));
        registry
    }

    /// Append a driver; earlier registrations probe first.
    pub fn register(&mut self, driver: Box<dyn MusicDriver>) {
        tracing::debug!(driver = driver.name(), "driver registered");
        self.drivers.push(driver);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    /// Name of the first driver claiming `path`.
    pub fn probe(&self, path: &Path) -> Option<&'static str> {
        self.drivers
            .iter()
            .find(|d| d.probe(path))
            .map(|d| d.name())
    }

    /// Load `short_path` with the first probing driver that accepts it.
    ///
    /// The current session is ended first. A driver that fails to load is
    /// skipped and the next candidate tried; the last failure is returned.
    pub fn load(&mut self, short_path: &Path, long_path: &Path) -> Result<&mut dyn MusicDriver> {
        self.end_all();

        let mut last_err = None;
        let mut loaded = None;
        for (idx, driver) in self.drivers.iter_mut().enumerate() {
            if !driver.probe(short_path) {
                continue;
            }
            match driver.load(short_path, long_path) {
                Ok(()) => {
                    loaded = Some(idx);
                    break;
                }
                Err(e) => {
                    tracing::debug!(driver = driver.name(), "load failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        match loaded {
            Some(idx) => {
                self.active = Some(idx);
                Ok(self.drivers[idx].as_mut())
            }
            None => Err(last_err.unwrap_or_else(|| {
                DriverError::Load(format!("no driver for {}", short_path.display()))
            })),
        }
    }

    /// Driver owning the current session.
    pub fn active(&self) -> Option<&dyn MusicDriver> {
        self.active.map(|idx| self.drivers[idx].as_ref())
    }

    pub fn active_mut(&mut self) -> Option<&mut dyn MusicDriver> {
        match self.active {
            Some(idx) => Some(self.drivers[idx].as_mut()),
            None => None,
        }
    }

    /// End the active session, if any.
    pub fn end_all(&mut self) {
        if let Some(idx) = self.active.take() {
            let driver = &mut self.drivers[idx];
            if let Err(e) = driver.end() {
                tracing::warn!(driver = driver.name(), "end failed: {e}");
            }
        }
    }
}
