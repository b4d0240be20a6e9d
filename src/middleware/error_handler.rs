use axum::{
    body::{Body, HttpBody, to_bytes},
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};

const MAX_LOGGED_BODY: usize = 64 * 1024;

/// 记录所有 4xx/5xx 响应，响应体原样返回
pub async fn log_failures(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    // 体积未知或过大时不读取响应体，只记录状态
    let loggable = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|len| len <= MAX_LOGGED_BODY as u64);
    if !loggable {
        if status.is_server_error() {
            error!("{} {} failed - Status: {}", method, path, status);
        } else {
            warn!("{} {} rejected - Status: {}", method, path, status);
        }
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_LOGGED_BODY).await {
        Ok(b) => b,
        Err(e) => {
            error!("{} {} failed - Status: {}, body unreadable: {}", method, path, status, e);
            parts.headers.remove(axum::http::header::CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };
    let body_str = String::from_utf8_lossy(&bytes);

    if status.is_server_error() {
        error!("{} {} failed - Status: {}, Body: {}", method, path, status, body_str);
    } else {
        warn!("{} {} rejected - Status: {}, Body: {}", method, path, status, body_str);
    }

    // 重置body以便重新构建响应
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
