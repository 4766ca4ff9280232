//! Read-only HTTP API over a persisted mirror.

pub mod api;
pub mod interface;
mod util;


pub use api::handle;
pub use util::Body;

use crate::mirror::MirrorStore;
use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// What every request handler can see
#[derive(Debug, Clone)]
pub struct ApiState {
    pub store: MirrorStore,
    /// Absolute base for links, without a trailing slash
    pub public_url: Option<String>,
}

impl ApiState {
    pub fn new(store: MirrorStore, public_url: &str) -> Self {
        let public_url = public_url.trim().trim_end_matches('/');
        Self {
            store,
            public_url: (!public_url.is_empty()).then(|| public_url.to_string()),
        }
    }
}

/// Bind `addr` and serve until the task is dropped
pub async fn serve(state: ApiState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    serve_listener(state, listener).await
}

/// Serve connections accepted from an already bound listener
pub async fn serve_listener(state: ApiState, listener: TcpListener) -> Result<()> {
    let state = Arc::new(state);
    tracing::info!(
        "Serving {} on http://{}",
        state.store.root().display(),
        listener.local_addr()?
    );

    loop {
        let (stream, peer) = listener.accept().await.context("Failed to accept connection")?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |request| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(handle(state, request).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!("Connection from {} ended with error: {}", peer, e);
            }
        });
    }
}
