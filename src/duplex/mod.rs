//! Full-duplex overlap handling.
//!
//! [`OverlapHandler`] consumes speaking flags, VAD confidence and classifier
//! output, and decides what to do with AI playback while the user talks over
//! it:
//!
//! ```text
//!           both speaking                     either stops
//! idle ────────────────────▶ overlap ────────────────────────▶ idle
//!        Continue | Duck | Wait   │ Continue | Duck | Interrupt | Wait
//!                                 └── re-evaluated on every update
//! ```
//!
//! Each finished overlap is appended to a bounded [`OverlapHistory`] from
//! which [`OverlapStatistics`] are recomputed.

mod config;
mod handler;
mod history;

pub use config::{FullDuplexConfig, FullDuplexConfigUpdate, OverlapMode};
pub use handler::{
    ActiveStream, DuplexState, OverlapAction, OverlapDecision, OverlapHandler, OverlapInput,
};
pub use history::{OverlapEvent, OverlapHistory, OverlapResolution, OverlapStatistics};
