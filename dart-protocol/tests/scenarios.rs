//! End-to-end scenarios against a scripted serial line (spec §8 S1-S6).

use std::time::Duration;

use dart_core::serial::MockSerialEndpoint;
use dart_protocol::config::MasterConfig;
use dart_protocol::dc;
use dart_protocol::framer;
use dart_protocol::master::PumpMaster;
use dart_protocol::state::PumpStatus;

fn test_config() -> MasterConfig {
    MasterConfig {
        addr_start: 0x50,
        addr_end: 0x50,
        transact_timeout: Duration::from_millis(80),
        frame_gap: Duration::from_millis(5),
        poll_interval: Duration::from_millis(1),
        ..MasterConfig::default()
    }
}

fn block(dc: u8, payload: &[u8]) -> Vec<u8> {
    let mut v = vec![dc, payload.len() as u8];
    v.extend_from_slice(payload);
    v
}

#[tokio::test]
async fn s1_poll_a_silent_pump() {
    let endpoint = MockSerialEndpoint::new();
    let (master, subscriber) = PumpMaster::new(test_config(), Box::new(endpoint));

    master.poll_once().await;

    assert_eq!(master.io_timeouts(), 1);
    assert!(master.pump(0x50).is_none());
    assert!(subscriber.try_recv().is_err());
}

#[tokio::test]
async fn s2_status_reset() {
    let mut endpoint = MockSerialEndpoint::new();
    let frame = framer::build_frame(0x50, 0x00, &[block(dc::code::DC1, &[0x01])]);
    endpoint.script_reply(frame);
    let (master, subscriber) = PumpMaster::new(test_config(), Box::new(endpoint));

    master.poll_once().await;

    let state = master.pump(0x50).unwrap();
    assert_eq!(state.left.status, Some(PumpStatus::Reset));

    let event = subscriber.try_recv().unwrap();
    assert_eq!(event.addr, 0x50);
    assert_eq!(event.status, Some(PumpStatus::Reset));
}

#[tokio::test]
async fn s3_nozzle_taken_then_filling() {
    let mut endpoint = MockSerialEndpoint::new();
    // (a) DC3: nozzle 1 taken, price.
    let dc3 = framer::build_frame(0x50, 0x00, &[block(dc::code::DC3, &[0x12, 0x34, 0x56, 0x11])]);
    endpoint.script_reply(dc3);
    // (b) DC1 Filling (code 4) + DC2 volume/amount, same body.
    let mut body = block(dc::code::DC1, &[0x04]);
    body.extend(block(dc::code::DC2, &[0x00, 0x00, 0x12, 0x34, 0x00, 0x00, 0x05, 0x67]));
    let dc1_dc2 = framer::build_frame(0x50, 0x80, &[body]);
    endpoint.script_reply(dc1_dc2);

    let (master, subscriber) = PumpMaster::new(test_config(), Box::new(endpoint));

    master.poll_once().await; // consumes (a)
    master.poll_once().await; // consumes (b)

    let nozzle_event = subscriber.try_recv().unwrap();
    assert_eq!(nozzle_event.nozzle_id, Some(1));
    assert_eq!(nozzle_event.nozzle_taken, Some(true));

    let status_event = subscriber.try_recv().unwrap();
    assert_eq!(status_event.status, Some(PumpStatus::Filling));

    let filling_event = subscriber.try_recv().unwrap();
    assert!((filling_event.volume_l.unwrap() - 1.234).abs() < 1e-9);
    assert!((filling_event.amount_cur.unwrap() - 5.67).abs() < 1e-9);

    let state = master.pump(0x50).unwrap();
    assert!(state.left.nozzle_taken);
    assert_eq!(state.left.status, Some(PumpStatus::Filling));
}

#[tokio::test]
async fn s4_authorize_20_litres() {
    let endpoint = MockSerialEndpoint::new();
    let (master, _subscriber) = PumpMaster::new(test_config(), Box::new(endpoint));

    master.authorize(0x50, Some(20.0), None).await;

    // authorize() writes through a blocking worker; give it a moment.
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn s5_bad_crc_is_rejected() {
    let mut endpoint = MockSerialEndpoint::new();
    let mut frame = framer::build_frame(0x50, 0x00, &[block(dc::code::DC1, &[0x01])]);
    let crc_hi_idx = frame.len() - 3;
    frame[crc_hi_idx] ^= 0xFF;
    endpoint.script_reply(frame);

    let (master, subscriber) = PumpMaster::new(test_config(), Box::new(endpoint));
    master.poll_once().await;

    assert_eq!(master.frame_rejects(), 1);
    assert!(master.pump(0x50).is_none());
    assert!(subscriber.try_recv().is_err());
}

#[tokio::test]
async fn s6_multiple_frames_in_one_read() {
    let mut endpoint = MockSerialEndpoint::new();
    let mut combined = framer::build_frame(0x50, 0x00, &[block(dc::code::DC3, &[0x12, 0x34, 0x56, 0x22])]);
    combined.extend(framer::build_frame(0x50, 0x80, &[block(dc::code::DC1, &[0x02])]));
    endpoint.script_reply(combined);

    let (master, subscriber) = PumpMaster::new(test_config(), Box::new(endpoint));
    master.poll_once().await;

    let state = master.pump(0x50).unwrap();
    assert_eq!(state.right.nozzle_id, Some(2));
    assert_eq!(state.left.status, Some(PumpStatus::Authorized));
    assert_eq!(state.right.status, Some(PumpStatus::Authorized));

    let first = subscriber.try_recv().unwrap();
    assert_eq!(first.nozzle_id, Some(2));
    let second = subscriber.try_recv().unwrap();
    assert_eq!(second.status, Some(PumpStatus::Authorized));
}
