//! Routing for the read API: `GET /registry` and `GET /registry/:name`.

use super::ApiState;
use super::interface::{ErrorResponse, ItemResponse, ListingEntry};
use super::util::{Body, json, json_ok};
use crate::error::MirrorError;
use hyper::header::HOST;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

enum Route {
    Listing,
    Item(String),
    Unknown,
}

fn route(method: &Method, path: &str) -> Route {
    if method != Method::GET {
        return Route::Unknown;
    }
    match path.trim_end_matches('/') {
        "/registry" => Route::Listing,
        other => match other.strip_prefix("/registry/") {
            Some(name) => Route::Item(name.to_string()),
            None => Route::Unknown,
        },
    }
}

/// Base for absolute links: the configured public URL, else the Host header
fn base_url<B>(state: &ApiState, request: &Request<B>) -> String {
    if let Some(public_url) = &state.public_url {
        return public_url.clone();
    }

    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    format!("http://{}", host)
}

/// Answer one request. Failures become JSON error payloads, never panics.
pub async fn handle<B>(state: Arc<ApiState>, request: Request<B>) -> Response<Body> {
    tracing::trace!("{} {}", request.method(), request.uri().path());

    let base = base_url(&state, &request);
    match route(request.method(), request.uri().path()) {
        Route::Listing => blocking(move || listing(&state, &base)).await,
        Route::Item(name) => blocking(move || item(&state, &name, &base)).await,
        Route::Unknown => json(
            ErrorResponse::not_found(format!(
                "No route for {} {}",
                request.method(),
                request.uri().path()
            )),
            StatusCode::NOT_FOUND,
        ),
    }
}

/// Store reads are synchronous filesystem work
async fn blocking<F>(f: F) -> Response<Body>
where
    F: FnOnce() -> Response<Body> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Request handler panicked: {}", e);
            json(
                ErrorResponse::internal_error("Request handler failed"),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

fn listing(state: &ApiState, base: &str) -> Response<Body> {
    match state.store.load_index() {
        Ok(entries) => {
            let listing: Vec<ListingEntry> = entries
                .unwrap_or_default()
                .iter()
                .map(|entry| ListingEntry::new(entry, base))
                .collect();
            json_ok(listing)
        }
        Err(e) => internal_error(e),
    }
}

fn item(state: &ApiState, name: &str, base: &str) -> Response<Body> {
    match state.store.load_component(name) {
        Ok(Some(component)) => json_ok(ItemResponse::new(component, base)),
        Ok(None) => json(
            ErrorResponse::not_found(format!("Item '{}' not found", name)),
            StatusCode::NOT_FOUND,
        ),
        Err(e) if e.is_user_error() => {
            json(ErrorResponse::bad_request(e.to_string()), StatusCode::BAD_REQUEST)
        }
        Err(e) => internal_error(e),
    }
}

fn internal_error(e: MirrorError) -> Response<Body> {
    tracing::error!("Read API store failure: {}", e);
    json(
        ErrorResponse::internal_error(e.to_string()),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}
