use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::SinkExt; // provides send on top of FramedWrite buf write and Sink trait
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tracing::{debug, info, warn};

use relay_protocol::{ChatCodec, Message};

use crate::error::DeliveryError;

static CHANNEL_SEED: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    pub fn next() -> Self {
        ChannelId(CHANNEL_SEED.fetch_add(1, Ordering::Relaxed))
    }
}

/// Outbound handle to one connected peer, the value side of the registry.
///
/// Delivery only enqueues, the peer's own writer task does the socket write,
/// so a slow peer can never hold up delivery to anyone else.
#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    name: String,
    addr: SocketAddr,
    tx: Sender<Arc<Message>>,
}

impl Channel {
    pub fn new(name: impl Into<String>, addr: SocketAddr, capacity: usize) -> (Self, Receiver<Arc<Message>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let channel = Channel {
            id: ChannelId::next(),
            name: name.into(),
            addr,
            tx,
        };
        (channel, rx)
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    // never waits, a full or torn down queue is a delivery failure
    pub fn deliver(&self, msg: Arc<Message>) -> Result<(), DeliveryError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull(self.name.clone()),
            TrySendError::Closed(_) => DeliveryError::Closed(self.name.clone()),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// drains one peer's outbound queue onto its socket
pub struct OutboundWriter {
    name: String,
    rx: Receiver<Arc<Message>>,
    fw: FramedWrite<OwnedWriteHalf, ChatCodec>,
}

impl OutboundWriter {
    pub fn new(name: impl Into<String>, rx: Receiver<Arc<Message>>, tcp_write: OwnedWriteHalf, codec: ChatCodec) -> Self {
        Self {
            name: name.into(),
            rx,
            fw: FramedWrite::new(tcp_write, codec),
        }
    }

    pub fn spawn(w: OutboundWriter) -> JoinHandle<()> {
        tokio::spawn(async move {
            w.handle_write().await;
        })
    }

    // Runs until every Channel clone is dropped or the socket fails.
    // Dropping the receiver on a write error makes later deliveries fail as Closed.
    async fn handle_write(mut self) {
        while let Some(msg) = self.rx.recv().await {
            debug!(user = %self.name, id = %msg.id, kind = %msg.msg_type, "writing to client socket");

            if let Err(e) = self.fw.send(msg).await {
                warn!(user = %self.name, "Unable to write to tcp socket: {}", e);
                return;
            }
        }

        // flush what's left and half close our side
        if let Err(e) = SinkExt::<Arc<Message>>::close(&mut self.fw).await {
            debug!(user = %self.name, "Error closing tcp write half: {}", e);
        }
        info!(user = %self.name, "Outbound writer finished");
    }
}
