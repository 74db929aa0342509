//! Error taxonomy shared across the protocol kernel.
//!
//! Propagation policy (spec §7): only `ConfigError` and `SerialFatal` are
//! meant to surface to a caller as `Err`. Everything else — `IoTimeout`,
//! `FrameReject`, `DecodeWarn` — is absorbed by the component that observes
//! it and only counted/logged; callers should match on `DartError::is_fatal`
//! before deciding whether to propagate at all.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DartError {
    /// No bytes arrived within a `transact` deadline. Not an error condition
    /// on the wire — the poll loop treats this as normal silence.
    #[error("timed out waiting for a reply")]
    IoTimeout,

    /// A frame failed `classify_frame`: too short, bad delimiters, or bad CRC.
    #[error("frame rejected: {reason}")]
    FrameReject { reason: String },

    /// A known DC code carried a payload of unexpected length.
    #[error("could not decode {dc:#04x}: {reason}")]
    DecodeWarn { dc: u8, reason: String },

    /// Invalid baud/parity/address range. Fatal only at startup.
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// The serial endpoint closed or the hardware disappeared.
    #[error("serial endpoint is dead: {0}")]
    SerialFatal(String),
}

impl DartError {
    /// `ConfigError` and `SerialFatal` are the only variants meant to be
    /// surfaced to an external caller; everything else is absorbed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigError(_) | Self::SerialFatal(_))
    }
}

pub type Result<T> = std::result::Result<T, DartError>;
