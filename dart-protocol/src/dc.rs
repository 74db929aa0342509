//! Transaction block model: the `CDx`/`DCx` codes inside a frame body
//! (spec §3 "Transaction block").

use crate::codec;

/// Default offset (into a DC7 payload) of the 15-byte grade table
/// (spec §3, §9 REDESIGN note: one source variant used offset 35 — this
/// implementation defaults to 30 and keeps it a named, overridable constant).
pub const DEFAULT_GRADE_TABLE_OFFSET: usize = 30;

/// Minimum DC7 payload length (spec §3: "≥46 bytes").
pub const DC7_MIN_LEN: usize = 46;

pub mod code {
    pub const CD1: u8 = 0x01;
    pub const CD2: u8 = 0x02;
    pub const CD3: u8 = 0x03;
    pub const CD4: u8 = 0x04;
    pub const CD5: u8 = 0x05;

    pub const DC1: u8 = 0x01;
    pub const DC2: u8 = 0x02;
    pub const DC3: u8 = 0x03;
    pub const DC7: u8 = 0x07;
}

/// `DCC` sub-codes carried inside a CD1 command block (spec §3).
pub mod dcc {
    pub const RETURN_STATUS: u8 = 0x00;
    /// Compatibility shim: some source revisions used `0x01` for AUTHORIZE
    /// (spec §9 "AUTHORIZE DCC value"). Never used unless
    /// `MasterConfig::legacy_authorize_dcc` is set.
    pub const AUTHORIZE_LEGACY: u8 = 0x01;
    pub const RETURN_PUMP_PARAMS: u8 = 0x02;
    pub const RETURN_PUMP_IDENTITY: u8 = 0x03;
    pub const RETURN_FILLING_INFO: u8 = 0x04;
    pub const RESET: u8 = 0x05;
    pub const AUTHORIZE: u8 = 0x06;
    pub const STOP: u8 = 0x08;
    pub const SWITCH_OFF: u8 = 0x0A;
}

/// Build a single CD1 command block: `[CD1, 1, dcc]`.
#[must_use]
pub fn cd1(dcc: u8) -> Vec<u8> {
    vec![code::CD1, 0x01, dcc]
}

/// Build a CD2 allowed-nozzles block: `[CD2, N, id...]`.
#[must_use]
pub fn cd2(nozzle_ids: &[u8]) -> Vec<u8> {
    let mut block = vec![code::CD2, nozzle_ids.len() as u8];
    block.extend_from_slice(nozzle_ids);
    block
}

/// Build a CD3 preset-volume block: 4-byte big-endian milli-litres.
#[must_use]
pub fn cd3_preset_volume(volume_l: f64) -> Vec<u8> {
    let mut block = vec![code::CD3, 0x04];
    block.extend_from_slice(&codec::encode_preset_volume(volume_l));
    block
}

/// Build a CD4 preset-amount block: 4-byte big-endian hundredths of currency.
#[must_use]
pub fn cd4_preset_amount(amount_cur: f64) -> Vec<u8> {
    let mut block = vec![code::CD4, 0x04];
    block.extend_from_slice(&codec::encode_preset_amount(amount_cur));
    block
}

/// Build a CD5 price-update block: N nozzles, each a 3-byte packed-BCD price.
#[must_use]
pub fn cd5_price_update(prices_cur: &[f64]) -> Vec<u8> {
    let mut block = vec![code::CD5, (prices_cur.len() * 3) as u8];
    for price in prices_cur {
        block.extend_from_slice(&codec::encode_price_bcd(*price));
    }
    block
}

/// A decoded pump→host transaction (DC1/DC2/DC3/DC7), or an unrecognized
/// DC code passed through untouched (spec §3 "Unknown codes ... never crash").
#[derive(Debug, Clone, PartialEq)]
pub enum DcTransaction {
    /// DC1: raw status byte. Interpreting it into `PumpStatus` is the
    /// state machine's job (`state::PumpStatus::from(code)`), kept here as
    /// a plain `u8` to keep this module free of state-machine concerns.
    Status { code: u8 },
    /// DC2: dispensed volume (litres) and amount (currency units).
    Filling { volume_l: f64, amount_cur: f64 },
    /// DC3: nozzle id (1..15), taken flag, and current price.
    Nozzle {
        nozzle_id: u8,
        taken: bool,
        price_cur: f64,
    },
    /// DC7: grade table, `grade_table[n]` is the grade byte for nozzle `n`
    /// (1..15), `0` meaning "not configured" (spec §4.3: "Ignore zero
    /// entries").
    Params { grade_table: [u8; 16] },
}

/// Decode one transaction payload given its DC code. Returns `Err` with a
/// human-readable reason on an unexpected payload length (spec §7
/// `DecodeWarn`) — callers drop just this transaction and continue with
/// the rest of the body, they do not abort the frame.
pub fn decode_transaction(
    dc: u8,
    payload: &[u8],
    grade_table_offset: usize,
) -> Result<DcTransaction, String> {
    match dc {
        code::DC1 => {
            if payload.len() != 1 {
                return Err(format!("DC1 expected 1 byte, got {}", payload.len()));
            }
            Ok(DcTransaction::Status { code: payload[0] })
        }
        code::DC2 => {
            if payload.len() != 8 {
                return Err(format!("DC2 expected 8 bytes, got {}", payload.len()));
            }
            let (volume_l, amount_cur) =
                codec::decode_volume_amount_bcd(&payload[0..4], &payload[4..8]);
            Ok(DcTransaction::Filling {
                volume_l,
                amount_cur,
            })
        }
        code::DC3 => {
            if payload.len() != 4 {
                return Err(format!("DC3 expected 4 bytes, got {}", payload.len()));
            }
            let price_cur = codec::decode_price_bcd(&payload[0..3]);
            let nozio = payload[3];
            Ok(DcTransaction::Nozzle {
                nozzle_id: nozio & 0x0F,
                taken: nozio & 0x10 != 0,
                price_cur,
            })
        }
        code::DC7 => {
            if payload.len() < DC7_MIN_LEN {
                return Err(format!(
                    "DC7 expected at least {DC7_MIN_LEN} bytes, got {}",
                    payload.len()
                ));
            }
            if payload.len() < grade_table_offset + 15 {
                return Err(format!(
                    "DC7 grade table at offset {grade_table_offset} needs 15 more bytes, only {} present",
                    payload.len()
                ));
            }
            let mut grade_table = [0u8; 16];
            for (i, slot) in grade_table.iter_mut().enumerate().skip(1) {
                *slot = payload[grade_table_offset + i - 1];
            }
            Ok(DcTransaction::Params { grade_table })
        }
        other => Err(format!("unrecognized DC code {other:#04x}")),
    }
}
