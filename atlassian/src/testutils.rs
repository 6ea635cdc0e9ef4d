use crate::types::CredentialSet;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

type Handler = dyn Fn(&RecordedRequest) -> (StatusCode, serde_json::Value) + Send + Sync;

/// In-process HTTP server standing in for Jira/Confluence. Every request is
/// recorded and answered by the supplied handler.
pub struct TestServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    pub async fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (StatusCode, serde_json::Value) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handler: Arc<Handler> = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);
                let handler = handler.clone();
                let recorded = recorded.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let handler = handler.clone();
                        let recorded = recorded.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let bytes = body.collect().await.unwrap().to_bytes();
                            let request = RecordedRequest {
                                method: parts.method,
                                path: parts.uri.path().to_string(),
                                query: parts.uri.query().map(String::from),
                                authorization: parts
                                    .headers
                                    .get("authorization")
                                    .and_then(|h| h.to_str().ok())
                                    .map(String::from),
                                body: serde_json::from_slice(&bytes)
                                    .unwrap_or(serde_json::Value::Null),
                            };
                            let (status, json) = handler(&request);
                            recorded.lock().unwrap().push(request);

                            let mut response =
                                Response::new(Full::new(Bytes::from(json.to_string())));
                            *response.status_mut() = status;
                            Ok::<_, Infallible>(response)
                        }
                    });
                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        TestServer {
            base_url: format!("http://127.0.0.1:{port}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn test_credentials(base_url: &str) -> CredentialSet {
    CredentialSet {
        username: "user@example.com".into(),
        api_key: "token".into(),
        instance_url: base_url.to_string(),
        wiki_space: "REL".into(),
        wiki_parent_page_id: "1000".into(),
    }
}
