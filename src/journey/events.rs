//! In-process journey change notifications

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::models::{Attraction, ItemId, Journey, JourneyId, Stop, Transport};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum JourneyEvent {
    JourneyCreated(Journey),
    /// Carries the journey as reloaded after its total was recomputed
    JourneyUpdated(Journey),
    StopCreated(Stop),
    StopUpdated(Stop),
    StopDeleted { id: ItemId, journey_id: JourneyId },
    TransportCreated(Transport),
    TransportUpdated(Transport),
    TransportDeleted { id: ItemId, journey_id: JourneyId },
    AttractionCreated(Attraction),
    AttractionUpdated(Attraction),
    AttractionDeleted { id: ItemId, stop_id: ItemId },
}

impl JourneyEvent {
    /// Name clients subscribe to, e.g. `journey_updated`
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            JourneyEvent::JourneyCreated(_) => "journey_created",
            JourneyEvent::JourneyUpdated(_) => "journey_updated",
            JourneyEvent::StopCreated(_) => "stop_created",
            JourneyEvent::StopUpdated(_) => "stop_updated",
            JourneyEvent::StopDeleted { .. } => "stop_deleted",
            JourneyEvent::TransportCreated(_) => "transport_created",
            JourneyEvent::TransportUpdated(_) => "transport_updated",
            JourneyEvent::TransportDeleted { .. } => "transport_deleted",
            JourneyEvent::AttractionCreated(_) => "attraction_created",
            JourneyEvent::AttractionUpdated(_) => "attraction_updated",
            JourneyEvent::AttractionDeleted { .. } => "attraction_deleted",
        }
    }
}

#[derive(Clone)]
pub struct JourneyNotifier {
    sender: broadcast::Sender<JourneyEvent>,
}

impl Default for JourneyNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl JourneyNotifier {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JourneyEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget; having no subscribers is fine.
    pub fn publish(&self, event: JourneyEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => trace!(event = name, receivers, "Journey event published"),
            Err(_) => trace!(event = name, "Journey event dropped, no subscribers"),
        }
    }
}
