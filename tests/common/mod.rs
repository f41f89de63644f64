//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use preview_cron::relay::{Upstream, UpstreamError, UpstreamResponse};

/// Start a programmable backend on an ephemeral port.
///
/// `f` receives the raw request head (request line and headers) and returns
/// the status and body to send back.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let (status, body) = f(head).await;
                        let status_text = match status {
                            200 => "200 OK",
                            204 => "204 No Content",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Backend that always answers with a fixed status and body.
#[allow(dead_code)]
pub async fn start_mock_backend(status: u16, body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { (status, body.to_string()) }).await
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Case-insensitive lookup of a header in a raw request head.
#[allow(dead_code)]
pub fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

/// In-process upstream with a programmable reply, counting calls.
#[allow(dead_code)]
pub struct StubUpstream<F> {
    pub reply: F,
    pub calls: Arc<std::sync::atomic::AtomicUsize>,
}

#[allow(dead_code)]
impl<F> StubUpstream<F>
where
    F: Fn(&url::Url, &axum::http::HeaderMap) -> StubReply + Send + Sync + 'static,
{
    pub fn new(reply: F) -> Self {
        Self {
            reply,
            calls: Arc::default(),
        }
    }
}

/// What a [`StubUpstream`] does for one call.
#[allow(dead_code)]
pub enum StubReply {
    Respond(UpstreamResponse),
    Fail,
    Hang,
}

impl<F> Upstream for StubUpstream<F>
where
    F: Fn(&url::Url, &axum::http::HeaderMap) -> StubReply + Send + Sync + 'static,
{
    async fn get(
        &self,
        url: url::Url,
        headers: axum::http::HeaderMap,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match (self.reply)(&url, &headers) {
            StubReply::Respond(response) => Ok(response),
            StubReply::Fail => Err(UpstreamError::Unreachable("connection refused".into())),
            StubReply::Hang => std::future::pending().await,
        }
    }
}

/// Build a JSON POST for the relay endpoint.
#[allow(dead_code)]
pub fn relay_post(body: &str, client_ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/trigger-cron")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client_ip)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Collect a response body as JSON.
#[allow(dead_code)]
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
