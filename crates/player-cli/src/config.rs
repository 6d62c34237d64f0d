use std::path::PathBuf;

use anyhow::Result;
use stream_engine::EngineConfig;

use crate::cli::Args;

const DEFAULT_CONFIG_NAME: &str = "pocketplay.toml";

/// Settings resolved from the command line and the optional config file.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    pub engine: EngineConfig,
    pub device: Option<String>,
}

impl PlayerConfig {
    /// Resolve `--config` (or `pocketplay.toml` next to the executable) and apply flag overrides.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut engine = match args.config.as_deref() {
            Some(path) => EngineConfig::load(path)?,
            None => match auto_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    tracing::info!(path = %path.display(), "using config next to executable");
                    EngineConfig::load(&path)?
                }
                None => EngineConfig::default(),
            },
        };
        if args.raw_io {
            engine.use_buffered_io = false;
        }
        Ok(Self {
            engine,
            device: normalize_device_name(args.device.clone()),
        })
    }
}

fn auto_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(DEFAULT_CONFIG_NAME)))
}

/// Treat an empty or whitespace device name as "default device".
pub fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn raw_io_flag_disables_buffering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "use_buffered_io = true\nshow_encoder_msg = true\n").unwrap();
        let args = Args::try_parse_from([
            "pocketplay",
            "--config",
            path.to_str().unwrap(),
            "--raw-io",
            "--device",
            "  ",
            "probe",
            "a.aa3",
        ])
        .unwrap();
        let cfg = PlayerConfig::from_args(&args).unwrap();
        assert!(!cfg.engine.use_buffered_io);
        assert!(cfg.engine.show_encoder_msg);
        assert_eq!(cfg.device, None);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let args =
            Args::try_parse_from(["pocketplay", "--config", path.to_str().unwrap(), "list-devices"])
                .unwrap();
        assert!(PlayerConfig::from_args(&args).is_err());
    }

    #[test]
    fn device_name_is_trimmed() {
        assert_eq!(
            normalize_device_name(Some(" USB DAC ".into())).as_deref(),
            Some("USB DAC")
        );
    }
}
