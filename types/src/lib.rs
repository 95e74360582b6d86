pub mod audio;
pub mod config;
pub mod events;

pub use audio::{Base64EncodedAudioBytes, EncodedChunk, PlaybackSegment};
pub use config::SessionConfig;
pub use events::{ClientMessage, ServerMessage, SessionEvent};
