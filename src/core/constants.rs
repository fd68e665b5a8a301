//! Protocol and tuning constants.
//!
//! Wire values in this file are shared with the server and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// WIRE PROTOCOL
// =============================================================================

/// Version announced in `session.init`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Binary frame header size (type + big-endian sequence).
pub const FRAME_HEADER_SIZE: usize = 5;

/// Frame type: captured microphone PCM (client -> server).
pub const FRAME_TYPE_AUDIO_IN: u8 = 0x01;

/// Frame type: synthesized PCM (server -> client).
pub const FRAME_TYPE_AUDIO_OUT: u8 = 0x02;

/// Frame type: Opus-encoded microphone audio.
pub const FRAME_TYPE_AUDIO_IN_OPUS: u8 = 0x03;

/// Frame type: Opus-encoded synthesized audio.
pub const FRAME_TYPE_AUDIO_OUT_OPUS: u8 = 0x04;

/// WebSocket close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// WebSocket close code for an endpoint going away.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close reason asking the peer to retain session state.
pub const CLOSE_REASON_PRESERVE: &str = "preserve_session";

/// Close reason for a plain client disconnect.
pub const CLOSE_REASON_CLIENT: &str = "client_disconnect";

// =============================================================================
// CONNECTION TIMING
// =============================================================================

/// Time allowed for a link to open.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ping interval once the session is ready.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Time allowed for a pong before the link is considered dead.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// First reconnection delay.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on any reconnection delay.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Reconnection attempts before the transport gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

// =============================================================================
// QUALITY
// =============================================================================

/// Quality score below which a transport counts as degraded.
pub const DEFAULT_QUALITY_THRESHOLD: u8 = 50;

/// Consecutive degraded samples before the manager falls back.
pub const DEFAULT_DEGRADATION_SAMPLES: u32 = 3;

// =============================================================================
// DUPLEX
// =============================================================================

/// Overlap events retained for statistics.
pub const OVERLAP_HISTORY_CAPACITY: usize = 20;

/// Minimum overlap before the intelligent policy may interrupt.
pub const MIN_INTERRUPT_OVERLAP: Duration = Duration::from_millis(150);

/// VAD confidence the AI-priority policy requires before interrupting.
pub const AI_PRIORITY_INTERRUPT_CONFIDENCE: f32 = 0.9;

// =============================================================================
// AUDIO
// =============================================================================

/// Default capture sample rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
