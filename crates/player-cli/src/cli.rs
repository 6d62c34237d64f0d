use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "pocketplay", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Engine config file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Read compressed data straight from the file instead of through the read buffer
    #[arg(long, global = true)]
    pub raw_io: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List output devices and exit
    ListDevices,

    /// Print the driver that would handle a file
    Probe {
        path: PathBuf,
    },

    /// Load a file, print its metadata and unload it
    Info {
        path: PathBuf,
    },

    /// Play a file with interactive transport control on stdin
    Play {
        path: PathBuf,

        /// Start position in seconds
        #[arg(long)]
        seek: Option<f64>,

        /// Load without starting playback
        #[arg(long)]
        paused: bool,
    },

    /// Run playback without an audio device and write raw s16le stereo PCM
    Render {
        path: PathBuf,

        /// Output file for the rendered PCM
        #[arg(long)]
        out: PathBuf,

        /// Stop after this many seconds of output
        #[arg(long)]
        seconds: Option<f64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_subcommand() {
        let args = Args::try_parse_from([
            "pocketplay",
            "play",
            "song.aa3",
            "--seek",
            "12.5",
            "--raw-io",
            "--device",
            "usb",
        ])
        .unwrap();
        assert!(args.raw_io);
        assert_eq!(args.device.as_deref(), Some("usb"));
        match args.cmd {
            Command::Play { path, seek, paused } => {
                assert_eq!(path, PathBuf::from("song.aa3"));
                assert_eq!(seek, Some(12.5));
                assert!(!paused);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn render_requires_out() {
        assert!(Args::try_parse_from(["pocketplay", "render", "a.wav"]).is_err());
        let args =
            Args::try_parse_from(["pocketplay", "render", "a.wav", "--out", "a.pcm"]).unwrap();
        assert!(matches!(args.cmd, Command::Render { seconds: None, .. }));
    }
}
