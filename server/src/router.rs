use std::sync::Arc;

use tracing::{debug, warn};

use relay_protocol::{Message, MessageType};

use crate::delivery::Channel;
use crate::registry::Registry;

/// Where an inbound message goes, decided from the message and its sender alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Everyone online except the named sender.
    Broadcast { except: String },
    Direct(String),
    Group(Vec<String>),
    Drop(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NoReceiver,
    ServerOnly,      // user lists only ever come from the server
    NoDispatchRule,  // read confirmations have no routing yet
    Unrecognized(u8),
}

// counts only feed logs and tests, the sender never hears about them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

pub fn route(msg: &Message, sender: &str) -> Route {
    match msg.msg_type {
        MessageType::Text => Route::Broadcast { except: sender.to_owned() },
        MessageType::Private | MessageType::File => {
            match msg.receiver.as_deref().map(str::trim) {
                Some(r) if !r.is_empty() => Route::Direct(r.to_owned()),
                _ => Route::Drop(DropReason::NoReceiver),
            }
        },
        MessageType::Group => {
            let receivers: Vec<String> = msg.group_receivers()
                .into_iter()
                .filter(|r| r != sender)
                .collect();

            if receivers.is_empty() {
                Route::Drop(DropReason::NoReceiver)
            } else {
                Route::Group(receivers)
            }
        },
        MessageType::UserList => Route::Drop(DropReason::ServerOnly),
        MessageType::ConfirmRead => Route::Drop(DropReason::NoDispatchRule),
        MessageType::Unrecognized(tag) => Route::Drop(DropReason::Unrecognized(tag)),
    }
}

/// Executes routes against the registry, fire and forget.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Registry,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Dispatcher { registry }
    }

    pub async fn dispatch(&self, msg: Message, sender: &str) -> DispatchReport {
        let route = route(&msg, sender);
        let msg = Arc::new(msg);
        let mut report = DispatchReport::default();

        match route {
            Route::Broadcast { except } => {
                self.registry.for_each_except(Some(except.as_str()), |_, ch| {
                    deliver_one(ch, &msg, &mut report);
                }).await;
            },
            Route::Direct(receiver) => {
                match self.registry.lookup(&receiver).await {
                    Some(ch) => deliver_one(&ch, &msg, &mut report),
                    None => debug!(from = %sender, to = %receiver, "Receiver offline, message dropped"),
                }
            },
            Route::Group(receivers) => {
                // each member on its own, one failure doesn't stop the rest
                for receiver in receivers {
                    match self.registry.lookup(&receiver).await {
                        Some(ch) => deliver_one(&ch, &msg, &mut report),
                        None => debug!(from = %sender, to = %receiver, "Group member offline, skipped"),
                    }
                }
            },
            Route::Drop(DropReason::Unrecognized(tag)) => {
                warn!(from = %sender, id = %msg.id, "Unrecognized message type {:#04x}, dropped", tag);
            },
            Route::Drop(reason) => {
                debug!(from = %sender, id = %msg.id, kind = %msg.msg_type, "Message dropped: {:?}", reason);
            },
        }

        debug!(from = %sender, kind = %msg.msg_type, delivered = report.delivered,
               failed = report.failed, "dispatched");
        report
    }
}

fn deliver_one(ch: &Channel, msg: &Arc<Message>, report: &mut DispatchReport) {
    // writer already gone, connection is on its way out
    if ch.is_closed() {
        debug!(addr = %ch.addr(), id = %msg.id, "Recipient closed, skipped");
        report.failed += 1;
        return;
    }

    match ch.deliver(Arc::clone(msg)) {
        Ok(()) => report.delivered += 1,
        Err(e) => {
            warn!(addr = %ch.addr(), "Delivery failed: {}", e);
            report.failed += 1;
        }
    }
}
