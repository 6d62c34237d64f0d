//! Streaming playback engine.
//!
//! Format drivers decode compressed tracks one unit at a time into a decode-ahead
//! buffer that a real-time output callback drains. The control path (load, play,
//! pause, seek, fast review, suspend/resume) only queues intents; the callback
//! applies them.

pub mod backend;
pub mod bitrate;
pub mod buffer;
pub mod config;
pub mod decode;
pub mod drivers;
pub mod error;
pub mod harness;
pub mod output;
pub mod power;
pub mod reader;
pub mod registry;
pub mod status;
pub mod tags;

pub use config::EngineConfig;
pub use drivers::{DriverContext, MusicDriver, StreamingDriver};
pub use error::{BackendError, DriverError};
pub use harness::{AudioHarness, CallbackOutcome, FrameSource, ManualHarness};
pub use registry::DriverRegistry;
