//! Loopback HTTP server for tests.
//!
//! An axum router whose fallback handler serves a queue of canned replies,
//! one per request, and records the requests it saw. Media replies honor
//! `Range: bytes=N-` and can break off or stall after some bytes to
//! simulate a dropped or hanging connection.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::stream::{self, StreamExt};

/// How the body of a reply ends.
#[derive(Debug, Clone, Copy)]
enum Ending {
    Complete,
    /// Error the body after this many bytes; the connection is aborted.
    CutAfter(usize),
    /// Send this many bytes, then never send more.
    StallAfter(usize),
}

/// A canned response.
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
    ranged: bool,
    ending: Ending,
}

impl Reply {
    pub(crate) fn status(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            content_type: "text/plain",
            body: Vec::new(),
            ranged: false,
            ending: Ending::Complete,
        }
    }

    pub(crate) fn json(body: &str) -> Self {
        Self {
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
            ..Self::status(200)
        }
    }

    pub(crate) fn bytes(body: Vec<u8>) -> Self {
        Self {
            content_type: "application/octet-stream",
            body,
            ..Self::status(200)
        }
    }

    /// Media body that answers range requests with 206.
    pub(crate) fn media(body: Vec<u8>) -> Self {
        Self {
            ranged: true,
            ..Self::bytes(body)
        }
    }

    /// Media body that ignores range requests and always sends everything.
    pub(crate) fn media_ignoring_range(body: Vec<u8>) -> Self {
        Self::bytes(body)
    }

    /// Abort the connection after `n` body bytes.
    pub(crate) fn cut_after(mut self, n: usize) -> Self {
        self.ending = Ending::CutAfter(n);
        self
    }

    /// Send `n` body bytes and then hang.
    pub(crate) fn stall_after(mut self, n: usize) -> Self {
        self.ending = Ending::StallAfter(n);
        self
    }

    fn into_response(self, range_start: Option<u64>) -> Response {
        let total = self.body.len() as u64;
        let (status, body, content_range) = match range_start {
            Some(start) if self.ranged && start < total => (
                StatusCode::PARTIAL_CONTENT,
                self.body[start as usize..].to_vec(),
                Some(format!("bytes {}-{}/{}", start, total - 1, total)),
            ),
            Some(_) if self.ranged => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                Vec::new(),
                Some(format!("bytes */{}", total)),
            ),
            _ => (self.status, self.body, None),
        };

        let length = body.len();
        let body = match self.ending {
            Ending::CutAfter(n) if n < length => {
                let head: Result<Bytes, std::io::Error> = Ok(Bytes::from(body[..n].to_vec()));
                let broken = Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection cut",
                ));
                Body::from_stream(stream::iter([head, broken]))
            }
            Ending::StallAfter(n) if n < length => {
                let head: Result<Bytes, Infallible> = Ok(Bytes::from(body[..n].to_vec()));
                Body::from_stream(stream::iter([head]).chain(stream::pending()))
            }
            _ => Body::from(body),
        };

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        if let Some(range) = content_range {
            headers.insert(header::CONTENT_RANGE, HeaderValue::from_str(&range).unwrap());
        }
        response
    }
}

/// A request the server received.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct Shared {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    requests: Mutex<Vec<Recorded>>,
}

impl Shared {
    fn next_reply(&self) -> Reply {
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => {
                *self.last.lock().unwrap() = Some(reply.clone());
                reply
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Reply::status(500)),
        }
    }
}

async fn handle(State(shared): State<Arc<Shared>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default()
        .to_vec();

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    let range_start = parts
        .headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.trim_end_matches('-').parse::<u64>().ok());

    let reply = shared.next_reply();
    shared.requests.lock().unwrap().push(Recorded {
        method: parts.method.to_string(),
        target: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
        headers,
        body,
    });

    reply.into_response(range_start)
}

/// Running test server; replies are consumed in order, the last one repeats.
pub(crate) struct MockServer {
    base: String,
    shared: Arc<Shared>,
}

impl MockServer {
    pub(crate) async fn start(replies: Vec<Reply>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        });

        let app = Router::new().fallback(handle).with_state(shared.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base: format!("http://{}", addr),
            shared,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub(crate) fn hits(&self) -> usize {
        self.shared.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<Recorded> {
        self.shared.requests.lock().unwrap().clone()
    }
}
