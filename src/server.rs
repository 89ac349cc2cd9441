// A padding oracle served over HTTP.
//
//   GET /challenge                 hex of IV || CBC(key, pad(secret))
//   GET /oracle?ciphertext=<hex>   200 valid padding, 403 invalid padding,
//                                  400 malformed request
use crate::{
    cipher::{encrypt_aes_128_cbc, random_bytes},
    LocalOracle, PaddingOracle,
};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, error, info};

use std::{collections::HashMap, sync::Arc};

pub async fn spawn_server(
    address: impl ToSocketAddrs,
    request_handler: OracleRequestHandler,
) -> std::io::Result<String> {
    let listener = TcpListener::bind(address).await?;
    let addr = listener.local_addr()?;
    let app = router(request_handler);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "padding oracle server stopped");
        }
    });
    info!(%addr, "serving padding oracle");
    Ok(format!("http://{}", addr))
}

pub fn router(request_handler: OracleRequestHandler) -> Router {
    Router::new()
        .route("/challenge", get(challenge))
        .route("/oracle", get(oracle))
        .with_state(Arc::new(request_handler))
}

#[derive(Debug, Clone)]
pub struct OracleRequestHandler {
    oracle: LocalOracle,
    challenge: Vec<u8>,
}

impl OracleRequestHandler {
    /// Encrypts `secret` under `key` and a fresh IV.
    pub fn new(key: [u8; 16], secret: &[u8]) -> Self {
        let iv = random_bytes::<16>();
        let ciphertext = encrypt_aes_128_cbc(secret, &key, &iv);
        Self {
            oracle: LocalOracle::new(key),
            challenge: [iv.as_slice(), &ciphertext].concat(),
        }
    }

    pub fn challenge(&self) -> &[u8] {
        &self.challenge
    }

    pub fn handle_request(&self, params: &HashMap<String, String>) -> Response {
        let ciphertext = match params.get("ciphertext") {
            Some(c) => match hex::decode(c) {
                Ok(c) => c,
                Err(e) => {
                    return (StatusCode::BAD_REQUEST, format!("Illegal ciphertext: {}", e))
                        .into_response()
                }
            },
            None => {
                return (StatusCode::BAD_REQUEST, "Missing 'ciphertext' parameter").into_response()
            }
        };

        match self.oracle.query(&ciphertext) {
            Ok(true) => (StatusCode::OK, "Padding is valid").into_response(),
            Ok(false) => (StatusCode::FORBIDDEN, "Invalid padding").into_response(),
            Err(e) => {
                debug!(len = ciphertext.len(), "rejected oracle query");
                (StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
        }
    }
}

async fn challenge(State(handler): State<Arc<OracleRequestHandler>>) -> String {
    hex::encode(handler.challenge())
}

async fn oracle(
    State(handler): State<Arc<OracleRequestHandler>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    handler.handle_request(&params)
}
