use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;

pub type Body = Full<Bytes>;

fn response(body: impl Into<Bytes>, content_type: &'static str, code: StatusCode) -> Response<Body> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = code;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn json<T: Serialize>(value: T, code: StatusCode) -> Response<Body> {
    match serde_json::to_vec(&value) {
        Ok(serialized) => response(serialized, "application/json", code),
        Err(err) => response(
            err.to_string(),
            "text/plain",
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    }
}

pub fn json_ok<T: Serialize>(value: T) -> Response<Body> {
    json(value, StatusCode::OK)
}
