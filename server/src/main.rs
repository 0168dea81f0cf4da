use tracing::error;

use huddle_server::{config, RelayServer};

#[tokio::main]
async fn main() {
    #[cfg(debug_assertions)]
    {
        use tracing::Level;
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::fmt::init();
    }

    let server = RelayServer::new();
    if let Err(e) = server.run(config::port()).await {
        error!("server error: {}", e);
    }
}
