//! Engine configuration.
//!
//! Loaded from an optional TOML file and adjustable at run time through
//! `set_option` on a driver.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::DriverError;

/// Smallest window the buffered reader accepts.
pub const MIN_IO_BUFFER_SIZE: usize = 8192;

/// Tuning parameters shared by every driver.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Read compressed data through the buffered reader when the driver supports it.
    pub use_buffered_io: bool,
    /// Buffered reader window in bytes.
    pub io_buffer_size: usize,
    /// Render the encoder message in `get_info`.
    pub show_encoder_msg: bool,
    /// Sleep applied inside a non-playing callback, in milliseconds.
    pub silence_delay_ms: u64,
    /// Default fast-review step in seconds.
    pub review_step_seconds: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_buffered_io: true,
            io_buffer_size: 32 * 1024,
            show_encoder_msg: false,
            silence_delay_ms: 0,
            review_step_seconds: 5,
        }
    }
}

impl EngineConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<EngineConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Buffered reader window, raised to [`MIN_IO_BUFFER_SIZE`].
    pub fn io_buffer_size(&self) -> usize {
        self.io_buffer_size.max(MIN_IO_BUFFER_SIZE)
    }

    /// Apply a whitespace separated option list such as `show_encoder_msg=on`.
    ///
    /// A bare name turns the option on. Unknown names are ignored.
    pub fn apply_options(&mut self, values: &str) -> Result<(), DriverError> {
        for token in values.split_whitespace() {
            let (name, value) = match token.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (token, None),
            };
            match name.to_ascii_lowercase().as_str() {
                "show_encoder_msg" => self.show_encoder_msg = parse_switch(name, value)?,
                "use_buffered_io" => self.use_buffered_io = parse_switch(name, value)?,
                "io_buffer_size" => {
                    let raw = value.ok_or_else(|| {
                        DriverError::InvalidOption(format!("{name} needs a value"))
                    })?;
                    self.io_buffer_size = raw.parse().map_err(|_| {
                        DriverError::InvalidOption(format!("{name}: not a size: {raw}"))
                    })?;
                }
                other => tracing::debug!(option = other, "ignoring unknown option"),
            }
        }
        Ok(())
    }
}

fn parse_switch(name: &str, value: Option<&str>) -> Result<bool, DriverError> {
    let Some(value) = value else {
        return Ok(true);
    };
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(DriverError::InvalidOption(format!(
            "{name}: expected on/off, got {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_buffered_io() {
        let cfg = EngineConfig::default();
        assert!(cfg.use_buffered_io);
        assert!(!cfg.show_encoder_msg);
        assert_eq!(cfg.io_buffer_size(), 32 * 1024);
    }

    #[test]
    fn io_buffer_size_has_floor() {
        let cfg = EngineConfig {
            io_buffer_size: 100,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.io_buffer_size(), MIN_IO_BUFFER_SIZE);
    }

    #[test]
    fn apply_options_parses_switches() {
        let mut cfg = EngineConfig::default();
        cfg.apply_options("show_encoder_msg use_buffered_io=off io_buffer_size=16384 bogus=1")
            .unwrap();
        assert!(cfg.show_encoder_msg);
        assert!(!cfg.use_buffered_io);
        assert_eq!(cfg.io_buffer_size, 16384);
    }

    #[test]
    fn apply_options_rejects_bad_switch() {
        let mut cfg = EngineConfig::default();
        let err = cfg.apply_options("show_encoder_msg=maybe").unwrap_err();
        assert!(matches!(err, DriverError::InvalidOption(_)));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: EngineConfig = toml::from_str("show_encoder_msg = true").unwrap();
        assert!(cfg.show_encoder_msg);
        assert!(cfg.use_buffered_io);
        assert_eq!(cfg.review_step_seconds, 5);
    }
}
