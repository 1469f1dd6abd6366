use std::net::SocketAddr;

use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use relay_protocol::{ChatCodec, ChatMsg, NAME_SEPARATOR};

use crate::config::ServerConfig;
use crate::delivery::{Channel, OutboundWriter};
use crate::error::HandshakeError;
use crate::presence::{PresenceEvent, PresenceHandle};
use crate::registry::Registry;
use crate::router::Dispatcher;

type FrRead = FramedRead<OwnedReadHalf, ChatCodec>;

// Handles server communication from one client:
// handshake, then the inbound read loop, then teardown.
// Essentially this models a client actor on the server side
pub struct ClientHandler {
    addr: SocketAddr,
    config: ServerConfig,
    registry: Registry,
    dispatcher: Dispatcher,
    presence: PresenceHandle,
}

impl ClientHandler {
    pub fn new(addr: SocketAddr, config: ServerConfig, registry: Registry,
               dispatcher: Dispatcher, presence: PresenceHandle) -> Self {
        Self {
            addr,
            config,
            registry,
            dispatcher,
            presence,
        }
    }

    // Spawn tokio task to handle one client connection until it closes
    pub fn spawn(h: ClientHandler, tcp_socket: TcpStream) {
        let _ = tokio::spawn(async move {
            h.run(tcp_socket).await;
        });
    }

    pub async fn run(self, tcp_socket: TcpStream) {
        let (tcp_read, tcp_write) = tcp_socket.into_split();
        let codec = ChatCodec::with_max_frame_len(self.config.max_frame_len);
        let mut fr = FramedRead::new(tcp_read, codec.clone());

        // CONNECTING
        let name = match self.handshake(&mut fr).await {
            Ok(name) => name,
            Err(e) => {
                // dropping both halves closes the socket, nothing was registered
                warn!(addr = %self.addr, "Handshake rejected: {}", e);
                return;
            }
        };

        let (channel, outbound_rx) = Channel::new(&name, self.addr, self.config.outbound_capacity);
        let writer = OutboundWriter::spawn(OutboundWriter::new(&name, outbound_rx, tcp_write, codec));

        self.register(&name, channel.clone()).await;

        // ACTIVE
        self.handle_read(&name, fr).await;

        // CLOSED
        self.process_disconnect(&name, channel).await;
        self.release_writer(&name, writer).await;
    }

    // Read exactly one handshake frame carrying the chat name
    async fn handshake(&self, fr: &mut FrRead) -> Result<String, HandshakeError> {
        let frame = timeout(self.config.handshake_timeout, fr.next()).await
            .map_err(|_| HandshakeError::Timeout(self.config.handshake_timeout))?;

        match frame {
            Some(Ok(ChatMsg::Join(name))) => validate_name(name, self.config.max_username_len),
            Some(Ok(ChatMsg::Record(msg))) => Err(HandshakeError::UnexpectedRecord(msg.msg_type)),
            Some(Err(e)) => Err(HandshakeError::Malformed(e)),
            None => Err(HandshakeError::Closed),
        }
    }

    async fn register(&self, name: &str, channel: Channel) {
        self.registry.register(name, channel).await;
        info!(user = %name, addr = %self.addr, "User joined");
        self.presence.notify(PresenceEvent::Joined(name.to_owned()));
    }

    // Loop to handle ongoing client msgs, each one is fully dispatched
    // before the next is read so a sender's messages keep their order
    async fn handle_read(&self, name: &str, mut fr: FrRead) {
        loop {
            match fr.next().await {
                Some(Ok(ChatMsg::Record(msg))) => {
                    debug!(user = %name, id = %msg.id, kind = %msg.msg_type, "server received record");
                    self.dispatcher.dispatch(msg, name).await;
                },
                Some(Ok(ChatMsg::Join(again))) => {
                    warn!(user = %name, "Ignoring repeated handshake as {:?}", again);
                },
                Some(Err(e)) => {
                    info!(user = %name, "Server connection closing error: {}", e);
                    break;
                },
                None => {
                    info!(user = %name, "Client connection has closed");
                    break;
                },
            }
        }
    }

    // process client disconnection event
    async fn process_disconnect(&self, name: &str, channel: Channel) {
        if self.registry.unregister_channel(name, channel.id()).await {
            info!(user = %name, addr = %self.addr, "User has left");
            self.presence.notify(PresenceEvent::Left(name.to_owned()));
        } else {
            debug!(user = %name, "Registration already replaced, nothing to remove");
        }
        // last sender clone goes here, the writer drains and closes the socket
        drop(channel);
    }

    // A peer that stopped reading leaves the writer parked in a socket write,
    // so it only gets a bounded time to flush before it is cut off.
    // Aborting drops the write half, the read half is already gone, so the socket closes.
    async fn release_writer(&self, name: &str, mut writer: JoinHandle<()>) {
        match timeout(self.config.writer_drain_timeout, &mut writer).await {
            Ok(Ok(())) => debug!(user = %name, "Outbound writer drained"),
            Ok(Err(e)) => warn!(user = %name, "Outbound writer task failed: {}", e),
            Err(_) => {
                writer.abort();
                warn!(user = %name, addr = %self.addr,
                      "Outbound writer still blocked after {:?}, dropping connection",
                      self.config.writer_drain_timeout);
            },
        }
    }
}

pub fn validate_name(name: String, max_len: usize) -> Result<String, HandshakeError> {
    let trimmed = name.trim();

    let reason = if trimmed.is_empty() {
        Some("empty")
    } else if trimmed.len() > max_len {
        Some("too long")
    } else if trimmed.contains(NAME_SEPARATOR) {
        Some("contains group separator")
    } else if trimmed.chars().any(char::is_control) {
        Some("contains control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(HandshakeError::InvalidName { name, reason }),
        None => Ok(trimmed.to_owned()),
    }
}
