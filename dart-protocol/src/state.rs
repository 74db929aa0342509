//! Pump address space and per-pump state (spec §3, §4.3 "State machine").

use std::collections::HashMap;
use std::time::Instant;

use dashmap::DashMap;

/// A validated MKR-5 bus address, `0x50..=0x6F` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PumpAddress(u8);

impl PumpAddress {
    pub const MIN: u8 = 0x50;
    pub const MAX: u8 = 0x6F;

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for PumpAddress {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!(
                "address {value:#04x} outside MKR-5 range {:#04x}..={:#04x}",
                Self::MIN,
                Self::MAX
            ))
        }
    }
}

impl std::fmt::Display for PumpAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Which physical side of a two-sided pump a nozzle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Default nozzle→side mapping: odd nozzle ids are the left side, even
/// ones the right (spec §3). An alternate mapping seen in one field
/// deployment ({1,3}→left, {2,4}→right when nozzles are not numbered
/// sequentially per side) was considered and rejected — it isn't
/// distinguishable from the default without out-of-band configuration,
/// so callers needing it should pass their own function instead of this
/// one.
#[must_use]
pub fn default_side_map(nozzle_id: u8) -> Side {
    if nozzle_id % 2 == 1 {
        Side::Left
    } else {
        Side::Right
    }
}

/// Pump status (DC1 status byte, spec §3). Any byte outside the documented
/// 0..=7 range is preserved in `Unknown` rather than rejected — an
/// unrecognized status must never abort the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    NotProgrammed,
    Reset,
    Authorized,
    AuthorizedSuspended,
    Filling,
    FillingCompleted,
    MaxReached,
    SwitchedOff,
    Unknown(u8),
}

impl From<u8> for PumpStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::NotProgrammed,
            1 => Self::Reset,
            2 => Self::Authorized,
            3 => Self::AuthorizedSuspended,
            4 => Self::Filling,
            5 => Self::FillingCompleted,
            6 => Self::MaxReached,
            7 => Self::SwitchedOff,
            other => Self::Unknown(other),
        }
    }
}

impl PumpStatus {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::NotProgrammed => 0,
            Self::Reset => 1,
            Self::Authorized => 2,
            Self::AuthorizedSuspended => 3,
            Self::Filling => 4,
            Self::FillingCompleted => 5,
            Self::MaxReached => 6,
            Self::SwitchedOff => 7,
            Self::Unknown(code) => code,
        }
    }

    /// True for any state the state machine treats as "actively dispensing"
    /// (spec §4.3: `→ Filling` starts DC2 event emission).
    #[must_use]
    pub fn is_filling(self) -> bool {
        matches!(self, Self::Filling)
    }
}

impl Default for PumpStatus {
    fn default() -> Self {
        Self::Unknown(0xFF)
    }
}

/// Per-side observed state, built up out of DC2/DC3 transactions and the
/// DC1 status byte.
#[derive(Debug, Clone, Default)]
pub struct SideState {
    pub status: Option<PumpStatus>,
    pub volume_l: f64,
    pub amount_cur: f64,
    pub preset_vol: Option<f64>,
    pub preset_amt: Option<f64>,
    pub nozzle_taken: bool,
    pub nozzle_id: Option<u8>,
    pub grade: Option<u8>,
    pub price_cur: Option<f64>,
}

/// Everything known about one pump address.
#[derive(Debug, Clone)]
pub struct PumpState {
    pub left: SideState,
    pub right: SideState,
    /// `grade_table[nozzle_id] = grade`, populated from DC7, zero entries
    /// dropped (spec §4.3: "Ignore zero entries").
    pub grade_table: HashMap<u8, u8>,
    /// Side inferred from the most recent DC3 nozzle event, used to route
    /// the next DC2 volume/amount update (spec §9: DC2 itself carries no
    /// side indicator).
    pub last_nozzle_side: Option<Side>,
    pub last_seen: Instant,
}

impl Default for PumpState {
    fn default() -> Self {
        Self {
            left: SideState::default(),
            right: SideState::default(),
            grade_table: HashMap::new(),
            last_nozzle_side: None,
            last_seen: Instant::now(),
        }
    }
}

impl PumpState {
    pub fn side_mut(&mut self, side: Side) -> &mut SideState {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn side(&self, side: Side) -> &SideState {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }
}

/// Shared, concurrently-readable pump state table. Modeled on the
/// teacher's `router.rs` peer table: a single `DashMap` keyed by address,
/// lazily populated the first time a pump is observed on the bus rather
/// than pre-seeded, since the address range the master is configured to
/// poll may include silent or absent addresses (spec §8 S1).
#[derive(Default)]
pub struct StateStore {
    inner: DashMap<u8, PumpState>,
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Run `f` against the pump's state, creating a fresh default entry on
    /// first observation.
    pub fn update<F, R>(&self, addr: PumpAddress, f: F) -> R
    where
        F: FnOnce(&mut PumpState) -> R,
    {
        let mut entry = self.inner.entry(addr.get()).or_default();
        let result = f(&mut entry);
        entry.touch();
        result
    }

    #[must_use]
    pub fn get(&self, addr: PumpAddress) -> Option<PumpState> {
        self.inner.get(&addr.get()).map(|e| e.clone())
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<(u8, PumpState)> {
        self.inner
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    #[must_use]
    pub fn known_addresses(&self) -> Vec<u8> {
        self.inner.iter().map(|e| *e.key()).collect()
    }
}
