//! DriveWire — Protocol Types
//!
//! Wire-level types for the DriveWire realtime channel. This crate is the
//! single source of truth for the negotiation frame codec, the steady-state
//! packet model, session parameters, realtime event schemas, and the error
//! taxonomy shared by the transport and client crates.

pub mod error;
pub mod events;
pub mod frame;
pub mod packet;
pub mod session;

pub use error::{Error, Result};
pub use events::{
    Address, Device, Dtc, EventBase, EventDetail, EventKind, Location, RealtimeEvent, Trip, User,
    Vehicle, VehicleEvent,
};
pub use frame::{decode_frames, Frame, FrameType, Frames};
pub use packet::Packet;
pub use session::SessionParameters;
