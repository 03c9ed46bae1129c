use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tokio::task_local;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

task_local! {
    static REQUEST_ID: String;
}

/// Request id for the current task, or "unknown" outside a request scope
/// (startup, background workers).
pub fn current() -> String {
    try_current().unwrap_or_else(|| "unknown".to_string())
}

pub fn try_current() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

/// Runs a future inside a request-id scope. Useful for background work
/// that wants correlated logs.
pub async fn scope<F>(id: String, fut: F) -> F::Output
where
    F: std::future::Future,
{
    REQUEST_ID.scope(id, fut).await
}

/// Ensures every request carries an id, propagates it to the task-local
/// scope, and echoes it back on the response.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = id.parse() {
        req.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let id_for_response = id.clone();
    let mut response = REQUEST_ID.scope(id, next.run(req)).await;
    if let Ok(value) = id_for_response.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
