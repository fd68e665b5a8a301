//! # voxduplex
//!
//! Voice duplex transport and barge-in classification for realtime voice
//! agents. It keeps an audio/control channel to a voice server alive and
//! decides what to do when the user talks while the AI is talking:
//!
//! - **Transport**: session handshake, heartbeat RTT, exponential-backoff
//!   reconnection, WebSocket and datagram links behind one interface
//! - **Selection**: fallback to the other link kind on hard failure or
//!   sustained quality loss
//! - **Classification**: backchannel, soft barge, hard barge or unclear, from
//!   transcript, duration and VAD confidence with fuzzy phrase matching
//! - **Overlap handling**: continue, duck, interrupt or wait, under three
//!   overlap policies and tool-call protection
//!
//! ## Feature Flags
//!
//! - `transport` (default): links, connection task and [`manager`]
//! - `session` (default): the [`session::VoiceSession`] orchestrator
//!
//! ## Modules
//!
//! - [`core`]: constants, errors, event bus, collaborator traits (always included)
//! - [`classifier`]: barge-in classifier and phrase tables (always included)
//! - [`duplex`]: overlap handler (always included)
//! - [`transport`]: link-level transport (requires `transport` feature)
//! - [`manager`]: transport selection and fallback (requires `transport` feature)
//! - [`session`]: session orchestration (requires `session` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use voxduplex::prelude::*;
//!
//! let classifier = BargeInClassifier::new(ClassifierConfig::default());
//! let input = ClassificationInput::new("uh huh", 300)
//!     .vad_confidence(0.6)
//!     .ai_was_playing(true);
//!
//! let result = classifier.classify(&input);
//! assert_eq!(result.classification, Classification::Backchannel);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Classification and overlap handling (always included)
pub mod classifier;
pub mod duplex;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Transport selection (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod manager;

// Session orchestration (feature-gated)
#[cfg(feature = "session")]
#[cfg_attr(docsrs, doc(cfg(feature = "session")))]
pub mod session;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::classifier::{
        BargeInClassifier, Classification, ClassificationInput, ClassificationResult,
        ClassifierConfig, PhraseTable,
    };
    pub use crate::duplex::{
        DuplexState, FullDuplexConfig, FullDuplexConfigUpdate, OverlapAction, OverlapHandler,
        OverlapInput, OverlapMode,
    };

    // Transport types (when enabled)
    #[cfg(feature = "transport")]
    pub use crate::transport::{
        BinaryFrame, ConnectionState, FrameType, Transport, TransportConfig, TransportError,
        TransportEvent, TransportKind, TransportResult,
    };

    #[cfg(feature = "transport")]
    pub use crate::manager::{ManagerConfig, SelectionStrategy, TransportManager};

    // Session types (when enabled)
    #[cfg(feature = "session")]
    pub use crate::session::{
        Collaborators, SessionConfig, SessionError, SessionEvent, SpeechSignal, VoiceSession,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{ConfigError, VoxError};

#[cfg(feature = "transport")]
pub use transport::{ConnectionState, Transport, TransportError};

#[cfg(feature = "session")]
pub use session::VoiceSession;
