//! The concrete event record published to subscribers (spec §3 "Event",
//! §6 "Event schema").

use crate::state::{PumpStatus, Side};

/// One observed change for one pump. Fields are `Option` — absent means
/// "unchanged since the last event for this pump" (spec §3: "Consumers
/// treat absent fields as 'no change'").
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub addr: u8,
    pub side: Option<Side>,
    pub status: Option<PumpStatus>,
    pub nozzle_id: Option<u8>,
    pub nozzle_taken: Option<bool>,
    pub grade: Option<u8>,
    pub price_cur: Option<f64>,
    pub volume_l: Option<f64>,
    pub amount_cur: Option<f64>,
}

impl Event {
    #[must_use]
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            side: None,
            status: None,
            nozzle_id: None,
            nozzle_taken: None,
            grade: None,
            price_cur: None,
            volume_l: None,
            amount_cur: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: PumpStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    #[must_use]
    pub fn with_nozzle(mut self, nozzle_id: u8, taken: bool) -> Self {
        self.nozzle_id = Some(nozzle_id);
        self.nozzle_taken = Some(taken);
        self
    }

    #[must_use]
    pub fn with_grade(mut self, grade: u8) -> Self {
        self.grade = Some(grade);
        self
    }

    #[must_use]
    pub fn with_price(mut self, price_cur: f64) -> Self {
        self.price_cur = Some(price_cur);
        self
    }

    #[must_use]
    pub fn with_filling(mut self, volume_l: f64, amount_cur: f64) -> Self {
        self.volume_l = Some(volume_l);
        self.amount_cur = Some(amount_cur);
        self
    }
}

pub use dart_core::events::{bounded, EventBus, EventSubscriber};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_leaves_unset_fields_none() {
        let event = Event::new(0x50).with_status(PumpStatus::Reset);
        assert_eq!(event.addr, 0x50);
        assert_eq!(event.status, Some(PumpStatus::Reset));
        assert_eq!(event.side, None);
        assert_eq!(event.volume_l, None);
    }

    #[test]
    fn nozzle_event_carries_both_id_and_taken() {
        let event = Event::new(0x51).with_nozzle(3, true);
        assert_eq!(event.nozzle_id, Some(3));
        assert_eq!(event.nozzle_taken, Some(true));
    }
}
