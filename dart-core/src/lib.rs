//! DART core
//!
//! Runtime-agnostic building blocks shared by the DART/MKR-5 protocol engine:
//! - A streaming byte buffer for frame recognition (`buffer`)
//! - The serial endpoint contract plus a mock and a real backend (`serial`)
//! - Shared configuration primitives (`config`)
//! - The error taxonomy (`error`)
//! - A bounded, drop-oldest event bus (`events`)
#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod serial;

pub mod prelude {
    pub use crate::buffer::FrameBuffer;
    pub use crate::config::{Parity, SerialConfig};
    pub use crate::error::DartError;
    pub use crate::events::EventBus;
    pub use crate::serial::{MockSerialEndpoint, SerialEndpoint};
}
