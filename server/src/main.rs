use tracing_subscriber::fmt;
use tracing::{error, Level};

use relay_server::{ServerConfig, ServerListener};

#[tokio::main]
async fn main() {
    fmt()
        .compact() // use abbreviated log format
        .with_max_level(Level::INFO)
        .with_thread_ids(true) // display thread id where event happens
        .init(); // set as default subscriber

    match ServerListener::bind(ServerConfig::default()).await {
        Ok(listener) => listener.run().await,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
