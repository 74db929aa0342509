//! Poll-scheduler and master configuration (spec §5, §6).

use std::time::Duration;

use dart_core::config::SerialConfig;
use serde::{Deserialize, Serialize};

use crate::dc::DEFAULT_GRADE_TABLE_OFFSET;

fn duration_millis_default_1000() -> Duration {
    Duration::from_millis(1000)
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Everything `PumpMaster` needs to run: the serial line, the address
/// range to poll, and the timing/price/compatibility knobs spec.md §5/§9
/// calls out. Loading this from TOML/env/CLI is an external collaborator's
/// job (spec §1) — this crate only consumes an already-built value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    pub serial: SerialConfig,

    pub addr_start: u8,
    pub addr_end: u8,

    #[serde(with = "duration_millis", default = "duration_millis_default_1000")]
    pub transact_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    #[serde(with = "duration_millis")]
    pub frame_gap: Duration,
    #[serde(with = "duration_millis")]
    pub startup_step_delay: Duration,

    pub nozzle_count: u8,
    pub startup_unit_price_cur: f64,

    /// Offset of the 15-byte grade table inside a DC7 payload. Spec.md §9:
    /// one source revision used 35 instead of the documented 30.
    pub grade_table_offset: usize,

    /// DCC value sent for AUTHORIZE. Spec.md §9 adopts 0x06; some source
    /// revisions used 0x01.
    pub authorize_dcc: u8,
    /// When set, `authorize` uses `dc::dcc::AUTHORIZE_LEGACY` (0x01)
    /// instead of `authorize_dcc`.
    pub legacy_authorize_dcc: bool,

    /// Strict (`false`, default) or permissive (`true`) STX recovery in
    /// `classify_frame` (spec §4.1 edge case).
    pub permissive_framing: bool,

    pub event_queue_capacity: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            addr_start: 0x50,
            addr_end: 0x6F,
            transact_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(250),
            frame_gap: Duration::from_millis(20),
            startup_step_delay: Duration::from_millis(50),
            nozzle_count: 4,
            startup_unit_price_cur: 45.00,
            grade_table_offset: DEFAULT_GRADE_TABLE_OFFSET,
            authorize_dcc: crate::dc::dcc::AUTHORIZE,
            legacy_authorize_dcc: false,
            permissive_framing: false,
            event_queue_capacity: 1024,
        }
    }
}

impl MasterConfig {
    /// Fatal config validation (spec §7 `ConfigError`).
    pub fn validate(&self) -> dart_core::error::Result<()> {
        self.serial.validate()?;

        if self.addr_start < 0x50 || self.addr_end > 0x6F || self.addr_start > self.addr_end {
            return Err(dart_core::error::DartError::ConfigError(format!(
                "address range {:#04x}..={:#04x} invalid for MKR-5 (0x50..=0x6F)",
                self.addr_start, self.addr_end
            )));
        }
        if self.nozzle_count == 0 {
            return Err(dart_core::error::DartError::ConfigError(
                "nozzle_count must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn effective_authorize_dcc(&self) -> u8 {
        if self.legacy_authorize_dcc {
            crate::dc::dcc::AUTHORIZE_LEGACY
        } else {
            self.authorize_dcc
        }
    }
}
