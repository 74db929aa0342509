//! MKR-5 / DART pump protocol engine.
//!
//! `framer` and `codec` are pure wire-format functions; `dc` models the
//! transaction blocks carried inside a frame body; `transport` owns the
//! serial line and the sequence bit; `state` and `events` hold what the
//! engine has learned about each pump; `master` is the scheduler that ties
//! all of it together; `control` is the thin adapter an external surface
//! (HTTP, CLI, whatever) talks to.

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod config;
pub mod control;
pub mod dc;
pub mod events;
pub mod framer;
pub mod master;
pub mod state;
pub mod transport;

pub mod prelude {
    pub use crate::config::MasterConfig;
    pub use crate::control::{Control, ControlError};
    pub use crate::events::{Event, EventSubscriber};
    pub use crate::master::PumpMaster;
    pub use crate::state::{PumpAddress, PumpState, PumpStatus, Side, SideState, StateStore};
    pub use crate::transport::Transport;
}
