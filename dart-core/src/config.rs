//! Shared serial-line configuration (spec §6).

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Default for Parity {
    fn default() -> Self {
        Self::Odd
    }
}

/// Byte-level serial line configuration.
///
/// `bytesize` and `stopbits` are exposed for completeness (spec §6) even
/// though the protocol only ever uses 8-O-1 or 8-N-1 in practice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub bytesize: u8,
    pub stopbits: u8,
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            parity: Parity::Odd,
            bytesize: 8,
            stopbits: 1,
            read_timeout: Duration::from_millis(200),
        }
    }
}

impl SerialConfig {
    /// Fatal config validation (spec §7 `ConfigError`), run once at startup.
    pub fn validate(&self) -> Result<(), crate::error::DartError> {
        if self.bytesize != 8 {
            return Err(crate::error::DartError::ConfigError(format!(
                "unsupported bytesize {}, DART requires 8",
                self.bytesize
            )));
        }
        if self.stopbits != 1 {
            return Err(crate::error::DartError::ConfigError(format!(
                "unsupported stopbits {}, DART requires 1",
                self.stopbits
            )));
        }
        if self.baud_rate == 0 {
            return Err(crate::error::DartError::ConfigError(
                "baud_rate must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
