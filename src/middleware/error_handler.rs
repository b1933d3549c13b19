use axum::{
    body::{Body, Bytes, to_bytes},
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use tracing::error;

/// 日志中记录的响应体最大字节数
const MAX_LOGGED_BODY: usize = 1024;

/// 记录所有 5xx 响应，响应体原样返回给客户端
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;

    if !response.status().is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            error!(
                "Server error on {} {} - Status: {}, body unreadable: {}",
                method, uri, parts.status, e
            );
            parts.headers.remove(header::CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };

    error!(
        "Server error on {} {} - Status: {}, Body: {}",
        method,
        uri,
        parts.status,
        logged_body(&bytes)
    );

    Response::from_parts(parts, Body::from(bytes))
}

fn logged_body(bytes: &Bytes) -> String {
    let shown = &bytes[..bytes.len().min(MAX_LOGGED_BODY)];
    let mut text = String::from_utf8_lossy(shown).into_owned();
    if bytes.len() > MAX_LOGGED_BODY {
        text.push_str(&format!("... ({} bytes)", bytes.len()));
    }
    text
}
