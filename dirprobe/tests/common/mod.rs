//! Minimal thread-per-connection HTTP responder for CLI tests.
//!
//! - `/slow*` never answers within the test's timeout
//! - `/hold*` answers 200 after [`HOLD`]
//! - `/ok*`, `/admin`, `/login` answer 200
//! - `/forbidden` answers 403
//! - anything else answers 404

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

pub const HOLD: Duration = Duration::from_millis(200);

/// Start the responder and return its base URL.
pub fn spawn_responder() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}/", listener.local_addr().unwrap());

    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || respond(stream));
        }
    });

    base
}

/// A base URL on a port nobody listens on.
pub fn refused_base() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

fn respond(mut stream: TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    let status = if path.starts_with("/slow") {
        thread::sleep(Duration::from_secs(5));
        return;
    } else if path.starts_with("/hold") {
        thread::sleep(HOLD);
        "200 OK"
    } else if path.starts_with("/ok") || path == "/admin" || path == "/login" {
        "200 OK"
    } else if path == "/forbidden" {
        "403 Forbidden"
    } else {
        "404 Not Found"
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
