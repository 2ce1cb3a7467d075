use civicfeed_common::model::{
    Id,
    post::{PostMarker, Status},
    user::UserMarker,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

pub const STATUS_UPDATE_EVENT: &str = "status-update";

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub event: &'static str,
    pub post_id: Id<PostMarker>,
    pub status: Status,
    pub updated_by: Id<UserMarker>,
}

impl StatusEvent {
    #[must_use]
    pub fn new(post_id: Id<PostMarker>, status: Status, updated_by: Id<UserMarker>) -> Self {
        Self {
            event: STATUS_UPDATE_EVENT,
            post_id,
            status,
            updated_by,
        }
    }
}

pub trait StatusNotifier: Send + Sync {
    fn publish(&self, event: StatusEvent);
}

/// Fans status events out to every live subscriber.
#[derive(Clone, Debug)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<StatusEvent>,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}

impl StatusNotifier for BroadcastNotifier {
    fn publish(&self, event: StatusEvent) {
        let post_id = event.post_id;
        match self.sender.send(event) {
            Ok(receivers) => debug!(%post_id, receivers, "Published status event"),
            Err(_) => debug!(%post_id, "No subscribers for status event"),
        }
    }
}
