//! In-process HTTP stub for tests
//!
//! Paths starting with `/missing` answer 404, `/down` always 503, `/flaky`
//! 500 on the first hit, `/limited` 429 on the first hit. Everything else
//! answers 200 with body `ok`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Default)]
struct Log {
    hits: HashMap<String, usize>,
    methods: Vec<String>,
}

pub(crate) struct TestServer {
    addr: SocketAddr,
    log: Arc<Mutex<Log>>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));

        let accept_log = log.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, accept_log.clone()));
            }
        });

        Self { addr, log, task }
    }

    pub(crate) fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub(crate) fn hits(&self, path: &str) -> usize {
        self.log.lock().hits.get(path).copied().unwrap_or(0)
    }

    pub(crate) fn total_hits(&self) -> usize {
        self.log.lock().hits.values().sum()
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.log.lock().methods.clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, log: Arc<Mutex<Log>>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&request);
    let mut parts = head.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let hit = {
        let mut log = log.lock();
        log.methods.push(method.clone());
        let hit = log.hits.entry(path.clone()).or_default();
        *hit += 1;
        *hit
    };

    let (status, extra) = if path.starts_with("/missing") {
        ("404 Not Found", "")
    } else if path.starts_with("/down") {
        ("503 Service Unavailable", "")
    } else if path.starts_with("/flaky") && hit == 1 {
        ("500 Internal Server Error", "")
    } else if path.starts_with("/limited") && hit == 1 {
        ("429 Too Many Requests", "Retry-After: 0\r\n")
    } else {
        ("200 OK", "")
    };

    let body = if status.starts_with("200") { "ok" } else { "" };
    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        status,
        body.len(),
        extra
    );
    if method != "HEAD" {
        response.push_str(body);
    }

    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
