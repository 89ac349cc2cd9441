// Serves a padding oracle over HTTP.
//
// `PADDING_ORACLE_ADDR` sets the listen address and `PADDING_ORACLE_MESSAGE`
// the secret to encrypt. Logging is controlled through `RUST_LOG`.

use padding_oracle::{cipher::random_bytes, server};

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_ADDR: &str = "127.0.0.1:9000";
const DEFAULT_MESSAGE: &str = "Attack at dawn. The padding will give us away.";

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("PADDING_ORACLE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let message =
        std::env::var("PADDING_ORACLE_MESSAGE").unwrap_or_else(|_| DEFAULT_MESSAGE.to_string());

    let handler = server::OracleRequestHandler::new(random_bytes::<16>(), message.as_bytes());
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "serving padding oracle");
    axum::serve(listener, server::router(handler)).await
}
