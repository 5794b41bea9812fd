//! Inbound event dispatch

use tracing::{debug, warn};

use super::Relay;
use crate::types::{ConnectionId, InboundEvent, OutboundEvent, RelayResult};

impl Relay {
    /// Route one inbound client event.
    ///
    /// Rejected events are logged and answered with an `error` event to the
    /// sender; the error is also returned to the caller. Events from
    /// connections that are no longer registered are ignored.
    pub fn dispatch(&self, id: ConnectionId, event: InboundEvent) -> RelayResult<()> {
        let result = match &event {
            InboundEvent::Join { room } => self.join(id, room).map(|outcome| {
                if let Some(outcome) = outcome {
                    debug!(connection = %id, room = %room, broadcast = %outcome.id(), "Join handled");
                }
            }),
            InboundEvent::Leave { room } => self.leave(id, room).map(|_| ()),
            InboundEvent::Ping => {
                self.send(id, OutboundEvent::Pong);
                Ok(())
            }
        };

        if let Err(e) = &result {
            warn!(connection = %id, event = ?event, error = %e, "Rejected client event");
            self.send(id, OutboundEvent::error(e.code(), e.to_string()));
        }
        result
    }
}
