//! Minimal HTTP/1.1 stub server for exercising the real transport.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Share this module via:
//!
//! ```rust
//! #[path = "common/http_stub.rs"]
//! mod http_stub;
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One request captured by the stub.
#[derive(Clone, Debug)]
pub struct CapturedRequest {
    /// Request line and headers.
    pub head: String,
    /// Raw request body.
    pub body: String,
}

impl CapturedRequest {
    /// Returns the value of `name`, if the header was sent.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.head, name)
    }
}

/// Stub that answers each connection with the next scripted response.
pub struct StubServer {
    /// Address the stub listens on.
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl StubServer {
    /// Starts serving `responses` (status and body) in order.
    pub async fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|err| panic!("bind stub listener: {err}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|err| panic!("stub address: {err}"));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&requests);

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let Some(request) = read_request(&mut stream).await else {
                    continue;
                };
                captured
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(request);
                write_response(stream, status, &body).await;
            }
        });

        Self { addr, requests }
    }

    /// Base URL to hand to the transport.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Requests captured so far.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

async fn read_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    let head_end = loop {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(chunk.get(..read)?);
        if let Some(pos) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(buffer.get(..head_end)?).into_owned();
    let content_length = header_value(&head, "content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() < head_end + content_length {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(chunk.get(..read)?);
    }
    let body = String::from_utf8_lossy(buffer.get(head_end..)?).into_owned();
    Some(CapturedRequest { head, body })
}

async fn write_response(mut stream: TcpStream, status: u16, body: &str) {
    let response = format!(
        "HTTP/1.1 {status} STUB\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    if stream.write_all(response.as_bytes()).await.is_ok() {
        let _ = stream.shutdown().await;
    }
}
