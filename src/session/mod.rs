//! Voice session orchestration.
//!
//! A [`VoiceSession`] ties the pieces together:
//!
//! ```text
//!   mic samples ──► bitrate controller ──► TransportManager ──► server
//!                                                │
//!   SessionEvent ◄── event pump ◄────────────────┘
//!
//!   SpeechSignal ──► BargeInClassifier ──► echo compensation ──► OverlapHandler
//! ```
//!
//! Echo monitoring and bitrate adaptation are optional [`Collaborators`];
//! without them audio is sent as 16 kHz PCM and VAD confidence is used as-is.

mod config;
mod error;
mod event;
#[allow(clippy::module_inception)]
mod session;

pub use config::*;
pub use error::*;
pub use event::*;
pub use session::*;
