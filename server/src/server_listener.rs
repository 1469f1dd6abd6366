use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::client_handler::ClientHandler;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::presence::{PresenceHandle, PresencePublisher};
use crate::registry::Registry;
use crate::router::Dispatcher;

pub struct ServerListener {
    listener: TcpListener,
    config: ServerConfig,
    registry: Registry,
    dispatcher: Dispatcher,
    presence: PresenceHandle,
}

impl ServerListener {
    /// Bind the listening socket and start the presence publisher.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.addr).await
            .map_err(|source| ServerError::Bind { addr: config.addr.clone(), source })?;

        info!("Server starting.. {:?}", listener.local_addr()?);

        let registry = Registry::new();
        let dispatcher = Dispatcher::new(registry.clone());
        let (publisher, presence) = PresencePublisher::new(registry.clone());
        PresencePublisher::spawn(publisher);

        Ok(ServerListener { listener, config, registry, dispatcher, presence })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    // Accept forever, one handler task per connection.
    // There is no shutdown path, the process exiting is the teardown.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((tcp_socket, addr)) => {
                    info!("Server received new client connection {:?}", &addr);

                    let handler = ClientHandler::new(addr, self.config.clone(), self.registry.clone(),
                                                     self.dispatcher.clone(), self.presence.clone());
                    ClientHandler::spawn(handler, tcp_socket);
                },
                Err(e) => {
                    // e.g. out of file descriptors, keep serving the live connections
                    error!("Unable to accept client connection: {}", e);
                },
            }
        }
    }

    pub fn spawn_accept(s: ServerListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            s.run().await;
        })
    }
}
