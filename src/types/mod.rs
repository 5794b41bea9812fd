//! Data types for the room relay
//!
//! Identifiers, wire events, room label rules, and the error type shared by
//! every component.

mod connection;
mod error;
mod event;
mod room;

pub use connection::ConnectionId;
pub use error::{RelayError, RelayResult};
pub use event::{InboundEvent, OutboundEvent};
pub use room::{validate_room_label, DEFAULT_MAX_ROOM_LABEL_LEN};
