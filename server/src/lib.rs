//! Server side of the chat relay: tracks who is online and routes each
//! inbound message to its recipients.

pub mod config;
pub mod error;

// state
pub mod registry;
pub mod presence;

// routing
pub mod router;
pub mod delivery;

// connections
pub mod client_handler;
pub mod server_listener;

pub use config::ServerConfig;
pub use error::{DeliveryError, HandshakeError, ServerError};
pub use registry::Registry;
pub use router::{route, DispatchReport, Dispatcher, DropReason, Route};
pub use server_listener::ServerListener;
