pub mod capture;
pub mod config;
pub mod playback;
pub mod session;
pub mod transport;

pub use gemini_live_audio_types as types;
pub use gemini_live_audio_utils as utils;

pub use playback::{OutputBus, PlaybackScheduler, SourceId};
pub use session::{Command, Notification, SessionManager, SessionState};
pub use transport::{Dial, LiveSession, TransportError};
