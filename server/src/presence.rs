use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use relay_protocol::Message;

use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Joined(String),
    Left(String),
}

// cloneable front end handed to every connection handler
#[derive(Clone)]
pub struct PresenceHandle {
    tx: UnboundedSender<PresenceEvent>,
}

impl PresenceHandle {
    pub fn notify(&self, event: PresenceEvent) {
        if self.tx.send(event).is_err() {
            warn!("Presence publisher is gone, user list not republished");
        }
    }
}

/// Rebroadcasts the whole online list after every registry change.
///
/// Events are handled one at a time by a single task, so the newest
/// USER_LIST on the wire is always built from the newest registry state.
/// Each publish walks every connection, which is fine for a few hundred users.
pub struct PresencePublisher {
    registry: Registry,
    rx: UnboundedReceiver<PresenceEvent>,
}

impl PresencePublisher {
    pub fn new(registry: Registry) -> (Self, PresenceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PresencePublisher { registry, rx }, PresenceHandle { tx })
    }

    pub fn spawn(mut p: PresencePublisher) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = p.rx.recv().await {
                debug!("Presence event received {:?}", &event);
                p.publish().await;
            }
            info!("No more presence senders");
        })
    }

    /// Send the online list to everyone on it, returns recipient count.
    ///
    /// The list and the recipients come from the same registry view, so a
    /// user who joins mid publish is either in both or in neither.
    pub async fn publish(&self) -> usize {
        let mut sent = 0;

        let online = self.registry.snapshot_for_each(
            |names| Arc::new(Message::user_list(names)),
            |msg, name, ch| {
                match ch.deliver(Arc::clone(msg)) {
                    Ok(()) => sent += 1,
                    Err(e) => warn!(user = %name, "User list not delivered: {}", e),
                }
            },
        ).await;

        info!(online, recipients = sent, "Published user list");
        sent
    }
}
