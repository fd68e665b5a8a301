//! Core types shared by every layer.
//!
//! This module has no async dependencies. It defines the protocol constants,
//! the error taxonomy, the typed event bus used for every event stream in the
//! crate, the collaborator traits consumed by the session layer, and the small
//! codec helpers those collaborators fall back to.

pub mod codec;
mod constants;
mod error;
mod events;
mod traits;

pub use constants::*;
pub use error::*;
pub use events::*;
pub use traits::*;
