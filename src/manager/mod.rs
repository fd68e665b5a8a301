//! Transport selection and fallback.
//!
//! [`TransportManager`] owns one active [`Transport`](crate::transport::Transport)
//! and republishes its events on a bus that survives switches. When the active
//! link fails hard, or (with [`SelectionStrategy::Adaptive`]) its quality stays
//! below the threshold for several heartbeats, the manager builds the other
//! kind through a [`TransportFactory`], connects it and swaps it in.

mod config;
#[allow(clippy::module_inception)]
mod manager;

pub use config::*;
pub use manager::*;
