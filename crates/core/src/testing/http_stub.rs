//! Loopback HTTP server for exercising the real fetch tiers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A request the stub received.
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
    /// `Host` header, port included.
    pub host: String,
    pub body: String,
    pub at: Instant,
}

/// What the stub answers with.
#[derive(Debug, Clone)]
pub struct StubReply {
    pub status: u16,
    pub body: String,
    /// Held before the reply is written.
    pub delay: Duration,
}

impl StubReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = dyn Fn(&StubRequest) -> StubReply + Send + Sync;

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    max_active: AtomicUsize,
    requests: Mutex<Vec<StubRequest>>,
}

/// HTTP/1.1 server on `127.0.0.1`, one connection per request.
///
/// # Example
///
/// ```rust,ignore
/// use albumdex_core::testing::{HttpStub, StubReply};
///
/// let stub = HttpStub::start(|req| StubReply::ok(format!("you asked for {}", req.path))).await?;
/// let url = stub.url("/list");
/// ```
pub struct HttpStub {
    port: u16,
    counters: Arc<Counters>,
    task: JoinHandle<()>,
}

impl HttpStub {
    pub async fn start(
        handler: impl Fn(&StubRequest) -> StubReply + Send + Sync + 'static,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let counters = Arc::new(Counters::default());
        let handler: Arc<Handler> = Arc::new(handler);

        let task = {
            let counters = counters.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(stream, handler.clone(), counters.clone()));
                }
            })
        };

        Ok(Self {
            port,
            counters,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// URL for `path` on `127.0.0.1`.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        lock(&self.counters.requests).clone()
    }

    /// Most requests ever in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }
}

impl Drop for HttpStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, handler: Arc<Handler>, counters: Arc<Counters>) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };

    let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
    counters.max_active.fetch_max(active, Ordering::SeqCst);
    lock(&counters.requests).push(request.clone());

    let reply = handler(&request);
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let head = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        reply.body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(reply.body.as_bytes()).await;
    let _ = stream.shutdown().await;

    counters.active.fetch_sub(1, Ordering::SeqCst);
}

async fn read_request(stream: &mut TcpStream) -> Option<StubRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let mut host = String::new();
    let mut content_length = 0usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("host") {
            host = value.to_string();
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap_or(0);
        }
    }

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(StubRequest {
        method,
        path,
        host,
        body: String::from_utf8_lossy(&body).into_owned(),
        at: Instant::now(),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_handler_reply() {
        let stub = HttpStub::start(|req| StubReply::status(201, format!("{} {}", req.method, req.path)))
            .await
            .unwrap();

        let response = reqwest::Client::new()
            .post(stub.url("/render"))
            .body("payload")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        assert_eq!(response.text().await.unwrap(), "POST /render");

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body, "payload");
        assert_eq!(requests[0].host, format!("127.0.0.1:{}", stub.port()));
    }
}
