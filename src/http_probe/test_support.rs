//! In-process stand-in for a Tally server, served with hyper.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    async fn record(req: Request<Incoming>) -> Self {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        // hyper hands header names over in lower case.
        let headers = req
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = match req.into_body().collect().await {
            Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
            Err(_) => String::new(),
        };

        RecordedRequest {
            method,
            path,
            headers,
            body,
        }
    }

    /// Header lookup by lower-case name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub(crate) enum Reply {
    Ok(String),
    Status(u16, String),
    /// Read the request and never answer.
    Hang,
}

pub(crate) struct MockTally {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTally {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.seen.lock().expect("request log poisoned").clone()
    }
}

pub(crate) async fn spawn_mock_tally<F>(responder: F) -> MockTally
where
    F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock Tally");
    let addr = listener.local_addr().expect("mock address");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let responder = Arc::new(responder);

    let log = seen.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let responder = responder.clone();
            let log = log.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let responder = responder.clone();
                    let log = log.clone();
                    async move {
                        let request = RecordedRequest::record(req).await;
                        let reply = (*responder)(&request);
                        log.lock().expect("request log poisoned").push(request);
                        Ok::<_, Infallible>(respond(reply).await)
                    }
                });

                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    MockTally { addr, seen }
}

async fn respond(reply: Reply) -> Response<Full<Bytes>> {
    let (status, body) = match reply {
        Reply::Ok(body) => (StatusCode::OK, body),
        Reply::Status(status, body) => (
            StatusCode::from_u16(status).expect("valid mock status"),
            body,
        ),
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            (StatusCode::OK, String::new())
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
    response
}

/// A local port with nothing listening on it.
pub(crate) async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind probe port");
    let port = listener.local_addr().expect("local address").port();
    drop(listener);
    port
}
