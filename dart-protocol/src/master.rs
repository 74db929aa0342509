//! The protocol engine: startup sequencing, the poll scheduler, DC dispatch,
//! and the host-initiated actions (spec §4.3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use dart_core::serial::SerialEndpoint;

use crate::config::MasterConfig;
use crate::dc::{self, DcTransaction};
use crate::events::{bounded, Event, EventBus, EventSubscriber};
use crate::framer::{self, FrameKind};
use crate::state::{default_side_map, PumpAddress, PumpState, PumpStatus, Side, StateStore};
use crate::transport::Transport;

pub struct PumpMaster {
    transport: Arc<Transport>,
    state: StateStore,
    events: EventBus<Event>,
    config: MasterConfig,
    side_map: fn(u8) -> Side,
    io_timeouts: AtomicU64,
    frame_rejects: AtomicU64,
    decode_warns: AtomicU64,
    unknown_dc: AtomicU64,
}

impl PumpMaster {
    #[must_use]
    pub fn new(config: MasterConfig, endpoint: Box<dyn SerialEndpoint>) -> (Self, EventSubscriber<Event>) {
        let transport = Arc::new(Transport::new(
            endpoint,
            config.frame_gap,
            config.transact_timeout,
        ));
        let (events, subscriber) = bounded(config.event_queue_capacity);
        (
            Self {
                transport,
                state: StateStore::new(),
                events,
                config,
                side_map: default_side_map,
                io_timeouts: AtomicU64::new(0),
                frame_rejects: AtomicU64::new(0),
                decode_warns: AtomicU64::new(0),
                unknown_dc: AtomicU64::new(0),
            },
            subscriber,
        )
    }

    /// Override the nozzle→side mapping (spec §9: "must provide a unit-test
    /// hook to override").
    #[must_use]
    pub fn with_side_map(mut self, side_map: fn(u8) -> Side) -> Self {
        self.side_map = side_map;
        self
    }

    #[must_use]
    pub fn io_timeouts(&self) -> u64 {
        self.io_timeouts.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn frame_rejects(&self) -> u64 {
        self.frame_rejects.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn decode_warns(&self) -> u64 {
        self.decode_warns.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn unknown_dc(&self) -> u64 {
        self.unknown_dc.load(Ordering::Relaxed)
    }

    /// True once the serial endpoint has reported a hard I/O failure (spec
    /// §7 `SerialFatal`). Control API callers should translate this into
    /// `ControlError::ServiceUnavailable`.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.transport.is_dead()
    }

    #[must_use]
    pub fn pump(&self, addr: u8) -> Option<PumpState> {
        PumpAddress::try_from(addr).ok().and_then(|a| self.state.get(a))
    }

    #[must_use]
    pub fn list_pumps(&self) -> Vec<(u8, PumpState)> {
        self.state.snapshot()
    }

    async fn transact_blocking(&self, addr: u8, blocks: Vec<Vec<u8>>, timeout: std::time::Duration) -> Vec<u8> {
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.transact(addr, &blocks, timeout))
            .await
            .unwrap_or_default()
    }

    async fn send_blocking(&self, addr: u8, blocks: Vec<Vec<u8>>) {
        let transport = self.transport.clone();
        let _ = tokio::task::spawn_blocking(move || transport.send(addr, &blocks)).await;
    }

    /// Run the per-address startup sequence: CD5 price broadcast, CD1
    /// RESET, CD1 RETURN_PUMP_PARAMS (spec §4.3 "Startup sequence").
    pub async fn startup(&self) -> dart_core::error::Result<()> {
        self.config.validate()?;

        for addr in self.config.addr_start..=self.config.addr_end {
            let prices = vec![self.config.startup_unit_price_cur; self.config.nozzle_count as usize];
            self.send_blocking(addr, vec![dc::cd5_price_update(&prices)]).await;
            tokio::time::sleep(self.config.startup_step_delay).await;

            self.send_blocking(addr, vec![dc::cd1(dc::dcc::RESET)]).await;
            tokio::time::sleep(self.config.startup_step_delay).await;

            let reply = self
                .transact_blocking(addr, vec![dc::cd1(dc::dcc::RETURN_PUMP_PARAMS)], self.config.transact_timeout)
                .await;
            self.handle_reply(addr, &reply);
            tokio::time::sleep(self.config.startup_step_delay).await;
        }
        Ok(())
    }

    /// Poll one address for status, decode and dispatch the reply.
    async fn poll_address(&self, addr: u8) {
        let reply = self
            .transact_blocking(addr, vec![dc::cd1(dc::dcc::RETURN_STATUS)], self.config.transact_timeout)
            .await;

        if reply.is_empty() {
            self.io_timeouts.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.handle_reply(addr, &reply);
    }

    /// Round-robin the configured address range once, sleeping `poll_interval`
    /// between addresses (spec §4.3 "Poll loop").
    pub async fn poll_once(&self) {
        for addr in self.config.addr_start..=self.config.addr_end {
            self.poll_address(addr).await;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Run the poll loop until `shutdown` is notified. Exits at the next
    /// address boundary (spec §5 "Cancellation").
    pub async fn run(self: Arc<Self>, shutdown: Arc<tokio::sync::Notify>) {
        loop {
            for addr in self.config.addr_start..=self.config.addr_end {
                tokio::select! {
                    biased;
                    () = shutdown.notified() => return,
                    () = self.poll_address(addr) => {}
                }
                tokio::select! {
                    biased;
                    () = shutdown.notified() => return,
                    () = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
    }

    /// Split a read into its constituent frames and classify each one
    /// (spec §4.1 "Multiple frames in one read": split on STX while
    /// preserving each fragment's leading STX, classify independently). A
    /// bare ACK carries no STX at all, so it is recognized directly before
    /// attempting a split.
    fn handle_reply(&self, addr: u8, raw: &[u8]) {
        if raw.is_empty() {
            return;
        }
        if raw.len() == 6 && raw[4] == framer::ETX && raw[5] == framer::SF {
            return;
        }

        let mut buf = dart_core::buffer::FrameBuffer::new();
        buf.extend(raw);
        let fragments = buf.split_on_stx(framer::STX);

        if fragments.is_empty() {
            self.classify_and_dispatch(addr, raw);
            return;
        }
        for fragment in fragments {
            self.classify_and_dispatch(addr, &fragment);
        }
    }

    fn classify_and_dispatch(&self, addr: u8, raw: &[u8]) {
        match framer::classify_frame(raw, self.config.permissive_framing) {
            FrameKind::Ack => {}
            FrameKind::Reject { reason } => {
                self.frame_rejects.fetch_add(1, Ordering::Relaxed);
                warn!(addr = format!("{addr:#04x}").as_str(), reason = reason.as_str(), "frame rejected");
            }
            FrameKind::Data { addr: frame_addr, body, .. } => {
                for (dc_code, payload) in framer::split_transactions(&body) {
                    self.dispatch(frame_addr, dc_code, &payload);
                }
            }
        }
    }

    fn dispatch(&self, addr: u8, dc_code: u8, payload: &[u8]) {
        let Ok(pump_addr) = PumpAddress::try_from(addr) else {
            warn!(addr = format!("{addr:#04x}").as_str(), "frame from address outside MKR-5 range");
            return;
        };

        match dc::decode_transaction(dc_code, payload, self.config.grade_table_offset) {
            Ok(txn) => self.apply_transaction(pump_addr, txn),
            Err(reason) if dc_code == dc::code::DC1 || dc_code == dc::code::DC2 || dc_code == dc::code::DC3 || dc_code == dc::code::DC7 => {
                self.decode_warns.fetch_add(1, Ordering::Relaxed);
                warn!(dc = dc_code, reason = reason.as_str(), "could not decode transaction");
            }
            Err(reason) => {
                self.unknown_dc.fetch_add(1, Ordering::Relaxed);
                debug!(dc = dc_code, reason = reason.as_str(), "unknown DC code, dropped");
            }
        }
    }

    fn apply_transaction(&self, addr: PumpAddress, txn: DcTransaction) {
        match txn {
            DcTransaction::Status { code } => self.apply_status(addr, PumpStatus::from(code)),
            DcTransaction::Filling { volume_l, amount_cur } => self.apply_filling(addr, volume_l, amount_cur),
            DcTransaction::Nozzle { nozzle_id, taken, price_cur } => self.apply_nozzle(addr, nozzle_id, taken, price_cur),
            DcTransaction::Params { grade_table } => self.apply_params(addr, grade_table),
        }
    }

    /// DC1: status applies to both sides (spec §4.3: "the protocol does not
    /// inherently indicate side in DC1"). Transitioning into Authorized
    /// zeroes that side's running totals.
    fn apply_status(&self, addr: PumpAddress, status: PumpStatus) {
        self.state.update(addr, |state| {
            for side_state in [&mut state.left, &mut state.right] {
                let entering_authorized =
                    status == PumpStatus::Authorized && side_state.status != Some(PumpStatus::Authorized);
                if entering_authorized {
                    side_state.volume_l = 0.0;
                    side_state.amount_cur = 0.0;
                }
                side_state.status = Some(status);
            }
        });
        info!(addr = %addr, status = ?status, "status update");
        self.events.publish(Event::new(addr.get()).with_status(status));
    }

    /// DC2: side is whatever the most recent DC3 said, falling back to
    /// `left` if this pump has never reported a nozzle (spec §4.3/§9).
    fn apply_filling(&self, addr: PumpAddress, volume_l: f64, amount_cur: f64) {
        let side = self
            .state
            .get(addr)
            .and_then(|s| s.last_nozzle_side)
            .unwrap_or(Side::Left);

        self.state.update(addr, |state| {
            let side_state = state.side_mut(side);
            side_state.volume_l = volume_l;
            side_state.amount_cur = amount_cur;
        });
        self.events
            .publish(Event::new(addr.get()).with_side(side).with_filling(volume_l, amount_cur));
    }

    fn apply_nozzle(&self, addr: PumpAddress, nozzle_id: u8, taken: bool, price_cur: f64) {
        let side = (self.side_map)(nozzle_id);
        let grade = self.state.get(addr).and_then(|s| s.grade_table.get(&nozzle_id).copied());

        self.state.update(addr, |state| {
            state.last_nozzle_side = Some(side);
            let side_state = state.side_mut(side);
            side_state.nozzle_taken = taken;
            side_state.nozzle_id = Some(nozzle_id);
            side_state.grade = grade;
            side_state.price_cur = Some(price_cur);
        });

        let mut event = Event::new(addr.get())
            .with_side(side)
            .with_nozzle(nozzle_id, taken)
            .with_price(price_cur);
        if let Some(grade) = grade {
            event = event.with_grade(grade);
        }
        self.events.publish(event);
    }

    fn apply_params(&self, addr: PumpAddress, grade_table: [u8; 16]) {
        self.state.update(addr, |state| {
            for (nozzle_id, &grade) in grade_table.iter().enumerate().skip(1) {
                if grade != 0 {
                    state.grade_table.insert(nozzle_id as u8, grade);
                }
            }
        });
        info!(addr = %addr, "pump parameters discovered");
    }

    /// Emit an optional preset (volume and/or amount) followed by AUTHORIZE,
    /// all in one frame (spec §4.3 "authorize").
    pub async fn authorize(&self, addr: u8, volume_l: Option<f64>, amount_cur: Option<f64>) {
        let mut blocks = Vec::new();
        if let Some(v) = volume_l {
            blocks.push(dc::cd3_preset_volume(v));
        }
        if let Some(a) = amount_cur {
            blocks.push(dc::cd4_preset_amount(a));
        }
        blocks.push(dc::cd1(self.config.effective_authorize_dcc()));
        self.send_blocking(addr, blocks).await;
    }

    /// Issue a single CD1 command (RESET/STOP/SWITCH_OFF/...).
    pub async fn command(&self, addr: u8, dcc: u8) {
        self.send_blocking(addr, vec![dc::cd1(dcc)]).await;
    }

    pub async fn set_allowed_nozzles(&self, addr: u8, ids: &[u8]) {
        self.send_blocking(addr, vec![dc::cd2(ids)]).await;
    }

    /// Trigger RETURN_PUMP_PARAMS then RETURN_STATUS, and return the
    /// resulting grade table snapshot (spec §4.3 "discover_nozzles").
    pub async fn discover_nozzles(&self, addr: u8) -> HashMap<u8, u8> {
        let params_reply = self
            .transact_blocking(addr, vec![dc::cd1(dc::dcc::RETURN_PUMP_PARAMS)], self.config.transact_timeout)
            .await;
        self.handle_reply(addr, &params_reply);

        let status_reply = self
            .transact_blocking(addr, vec![dc::cd1(dc::dcc::RETURN_STATUS)], self.config.transact_timeout)
            .await;
        self.handle_reply(addr, &status_reply);

        self.pump(addr).map(|p| p.grade_table).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dart_core::serial::MockSerialEndpoint;

    fn master_with_scripted_reply(reply: Vec<u8>) -> PumpMaster {
        let mut endpoint = MockSerialEndpoint::new();
        endpoint.script_reply(reply);
        let config = MasterConfig {
            addr_start: 0x50,
            addr_end: 0x50,
            transact_timeout: std::time::Duration::from_millis(50),
            frame_gap: std::time::Duration::from_millis(5),
            poll_interval: std::time::Duration::from_millis(1),
            ..MasterConfig::default()
        };
        let (master, _subscriber) = PumpMaster::new(config, Box::new(endpoint));
        master
    }

    fn block(dc: u8, payload: &[u8]) -> Vec<u8> {
        let mut v = vec![dc, payload.len() as u8];
        v.extend_from_slice(payload);
        v
    }

    #[tokio::test]
    async fn s2_status_reset_updates_state_and_emits_event() {
        let frame = framer::build_frame(0x50, 0x00, &[block(dc::code::DC1, &[0x01])]);
        let master = master_with_scripted_reply(frame);

        master.poll_address(0x50).await;

        let state = master.pump(0x50).unwrap();
        assert_eq!(state.left.status, Some(PumpStatus::Reset));
        assert_eq!(state.right.status, Some(PumpStatus::Reset));
    }

    #[tokio::test]
    async fn s1_silent_pump_counts_timeout_and_emits_nothing() {
        let master = master_with_scripted_reply(Vec::new());
        master.poll_address(0x50).await;
        assert_eq!(master.io_timeouts(), 1);
        assert!(master.pump(0x50).is_none());
    }

    #[tokio::test]
    async fn s5_bad_crc_counts_frame_reject_and_leaves_state_unchanged() {
        let mut frame = framer::build_frame(0x50, 0x00, &[block(dc::code::DC1, &[0x01])]);
        let crc_hi_idx = frame.len() - 3;
        frame[crc_hi_idx] ^= 0xFF;
        let master = master_with_scripted_reply(frame);

        master.poll_address(0x50).await;

        assert_eq!(master.frame_rejects(), 1);
        assert!(master.pump(0x50).is_none());
    }

    #[tokio::test]
    async fn s6_multiple_transactions_in_one_body_both_dispatch_in_order() {
        let mut body = block(dc::code::DC3, &[0x12, 0x34, 0x56, 0x11]);
        body.extend(block(dc::code::DC1, &[0x02]));
        let frame = framer::build_frame(0x50, 0x00, &[body]);
        let master = master_with_scripted_reply(frame);

        master.poll_address(0x50).await;

        let state = master.pump(0x50).unwrap();
        assert_eq!(state.left.nozzle_id, Some(1));
        assert!(state.left.nozzle_taken);
        assert_eq!(state.left.status, Some(PumpStatus::Authorized));
    }
}
