//! In-process HTTP server for integration tests.
//!
//! One request per connection, answered with `Connection: close`. The path
//! prefix picks the behavior:
//!
//! - `/slow*`    never answers (until the client goes away)
//! - `/hold*`    answers 200 after 150 ms
//! - `/missing*` closes the connection without a response
//! - `/ok*`, `/a`, `/b` answer 200
//! - anything else answers 404

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const HOLD: Duration = Duration::from_millis(150);

#[derive(Default)]
struct Stats {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

pub struct TestServer {
    pub base: String,
    stats: Arc<Stats>,
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        let stats = Arc::new(Stats::default());

        let accept_stats = stats.clone();
        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle(stream, accept_stats.clone()));
            }
        });

        Self {
            base,
            stats,
            accept_loop,
        }
    }

    /// Highest number of requests the server was handling at once.
    pub fn max_in_flight(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }

    /// Lowercased request heads, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.stats.requests.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

/// A base URL on a port nobody listens on.
pub fn refused_base() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

async fn handle(mut stream: TcpStream, stats: Arc<Stats>) {
    let Some(head) = read_head(&mut stream).await else {
        return;
    };
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    stats.requests.lock().unwrap().push(head.to_lowercase());

    let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    stats.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let status = if path.starts_with("/slow") {
        // Wait for the client to hang up.
        let mut byte = [0u8; 1];
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(10)) => {}
            _ = stream.read(&mut byte) => {}
        }
        None
    } else if path.starts_with("/hold") {
        tokio::time::sleep(HOLD).await;
        Some("200 OK")
    } else if path.starts_with("/missing") {
        None
    } else if path.starts_with("/ok") || path == "/a" || path == "/b" {
        Some("200 OK")
    } else {
        Some("404 Not Found")
    };

    // Released before answering, so a client that reuses its slot right
    // away is never counted twice.
    stats.in_flight.fetch_sub(1, Ordering::SeqCst);

    if let Some(status) = status {
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    }
}

async fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 || buf.len() > 16 * 1024 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(buf).ok()
}
