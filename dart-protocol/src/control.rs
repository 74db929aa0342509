//! The external collaborator contract (spec §4.5): translate outside
//! commands into `PumpMaster` calls, surface the event stream, and turn
//! internal failures into the three-way error surface spec §7 describes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::dc;
use crate::events::{Event, EventSubscriber};
use crate::master::PumpMaster;
use crate::state::{PumpAddress, PumpState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("no pump at address {0:#04x}")]
    NotFound(u8),
    #[error("transport is unavailable")]
    ServiceUnavailable,
}

/// Commands a caller may pass to `command()` (spec §4.3: "dcc ∈ {RESET,
/// STOP, SWITCH_OFF, AUTHORIZE, RETURN_*}").
const KNOWN_COMMAND_DCCS: [u8; 8] = [
    dc::dcc::RETURN_STATUS,
    dc::dcc::RETURN_PUMP_PARAMS,
    dc::dcc::RETURN_PUMP_IDENTITY,
    dc::dcc::RETURN_FILLING_INFO,
    dc::dcc::RESET,
    dc::dcc::AUTHORIZE,
    dc::dcc::STOP,
    dc::dcc::SWITCH_OFF,
];

pub struct Control {
    master: Arc<PumpMaster>,
    /// The event queue has exactly one subscriber (spec §3 "Lifecycles"):
    /// handed out once, then gone.
    subscriber: Mutex<Option<EventSubscriber<Event>>>,
}

impl Control {
    #[must_use]
    pub fn new(master: Arc<PumpMaster>, subscriber: EventSubscriber<Event>) -> Self {
        Self {
            master,
            subscriber: Mutex::new(Some(subscriber)),
        }
    }

    #[must_use]
    pub fn list_pumps(&self) -> Vec<(u8, PumpState)> {
        self.master.list_pumps()
    }

    fn check_alive(&self) -> Result<(), ControlError> {
        if self.master.is_dead() {
            Err(ControlError::ServiceUnavailable)
        } else {
            Ok(())
        }
    }

    /// Invalid/unknown addresses are `NotFound`, not `BadRequest` (spec §4.5:
    /// "invalid addresses → NotFound").
    fn validate_addr(&self, addr: u8) -> Result<PumpAddress, ControlError> {
        PumpAddress::try_from(addr).map_err(|_| ControlError::NotFound(addr))
    }

    pub async fn preset(
        &self,
        addr: u8,
        volume_l: Option<f64>,
        amount_cur: Option<f64>,
    ) -> Result<(), ControlError> {
        self.check_alive()?;
        self.validate_addr(addr)?;
        if volume_l.is_none() && amount_cur.is_none() {
            return Err(ControlError::BadRequest(
                "preset requires a volume and/or an amount".to_string(),
            ));
        }
        if volume_l.is_some_and(|v| v < 0.0) || amount_cur.is_some_and(|a| a < 0.0) {
            return Err(ControlError::BadRequest(
                "preset values must be non-negative".to_string(),
            ));
        }
        self.master.authorize(addr, volume_l, amount_cur).await;
        Ok(())
    }

    pub async fn command(&self, addr: u8, dcc: u8) -> Result<(), ControlError> {
        self.check_alive()?;
        self.validate_addr(addr)?;
        if !KNOWN_COMMAND_DCCS.contains(&dcc) {
            return Err(ControlError::BadRequest(format!(
                "unrecognized command dcc {dcc:#04x}"
            )));
        }
        self.master.command(addr, dcc).await;
        Ok(())
    }

    pub async fn allowed_nozzles(&self, addr: u8, ids: &[u8]) -> Result<(), ControlError> {
        self.check_alive()?;
        self.validate_addr(addr)?;
        if ids.is_empty() || ids.iter().any(|&id| id == 0 || id > 15) {
            return Err(ControlError::BadRequest(
                "nozzle ids must be in 1..=15".to_string(),
            ));
        }
        self.master.set_allowed_nozzles(addr, ids).await;
        Ok(())
    }

    pub async fn discover_nozzles(&self, addr: u8) -> Result<HashMap<u8, u8>, ControlError> {
        self.check_alive()?;
        self.validate_addr(addr)?;
        Ok(self.master.discover_nozzles(addr).await)
    }

    /// Hand out the single event subscriber. `None` if it was already taken.
    pub fn events_subscribe(&self) -> Option<EventSubscriber<Event>> {
        self.subscriber.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dart_core::serial::MockSerialEndpoint;
    use crate::config::MasterConfig;

    fn control() -> Control {
        let endpoint = MockSerialEndpoint::new();
        let (master, subscriber) = PumpMaster::new(MasterConfig::default(), Box::new(endpoint));
        Control::new(Arc::new(master), subscriber)
    }

    #[tokio::test]
    async fn preset_rejects_out_of_range_address() {
        let control = control();
        let err = control.preset(0x10, Some(20.0), None).await.unwrap_err();
        assert_eq!(err, ControlError::NotFound(0x10));
    }

    #[tokio::test]
    async fn preset_rejects_empty_request() {
        let control = control();
        let err = control.preset(0x50, None, None).await.unwrap_err();
        assert!(matches!(err, ControlError::BadRequest(_)));
    }

    #[tokio::test]
    async fn command_rejects_address_outside_mkr5_range() {
        let control = control();
        let err = control.command(0xFF, dc::dcc::RESET).await.unwrap_err();
        assert_eq!(err, ControlError::NotFound(0xFF));
    }

    #[tokio::test]
    async fn command_rejects_unknown_dcc() {
        let control = control();
        let err = control.command(0x50, 0xEE).await.unwrap_err();
        assert!(matches!(err, ControlError::BadRequest(_)));
    }

    #[tokio::test]
    async fn command_accepts_reset() {
        let control = control();
        assert!(control.command(0x50, dc::dcc::RESET).await.is_ok());
    }

    #[test]
    fn events_subscribe_is_single_use() {
        let control = control();
        assert!(control.events_subscribe().is_some());
        assert!(control.events_subscribe().is_none());
    }
}
