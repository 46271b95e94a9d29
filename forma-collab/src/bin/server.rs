//! Forma collaboration server.
//!
//! Binds a WebSocket listener, serves the shared scene, and persists
//! it across restarts. Configure with `PORT` and `RUST_LOG`.

use forma_collab::{CollabServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ServerConfig::from_env();
    let server = CollabServer::new(config);
    server.run().await
}
