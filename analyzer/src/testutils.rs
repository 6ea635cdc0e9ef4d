use atlassian::Issue;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::json;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct LlmRequest {
    pub api_key: Option<String>,
    pub body: serde_json::Value,
}

/// Fake chat-completions endpoint. Replies are served in order; the last one
/// repeats once the list is exhausted. A 200 reply wraps its text as the
/// message content of a single choice.
pub struct LlmServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<LlmRequest>>>,
}

impl LlmServer {
    pub async fn spawn(replies: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let replies = Arc::new(replies);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let replies = replies.clone();
                let recorded = recorded.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let replies = replies.clone();
                        let recorded = recorded.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let bytes = body.collect().await.unwrap().to_bytes();
                            let request = LlmRequest {
                                api_key: parts
                                    .headers
                                    .get("api-key")
                                    .and_then(|h| h.to_str().ok())
                                    .map(String::from),
                                body: serde_json::from_slice(&bytes)
                                    .unwrap_or(serde_json::Value::Null),
                            };
                            let index = {
                                let mut recorded = recorded.lock().unwrap();
                                recorded.push(request);
                                recorded.len() - 1
                            };
                            let (status, text) = &replies[index.min(replies.len() - 1)];

                            let payload = if *status == 200 {
                                json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
                            } else {
                                json!({"error": {"code": status.to_string()}})
                            };
                            let mut response =
                                Response::new(Full::new(Bytes::from(payload.to_string())));
                            *response.status_mut() = StatusCode::from_u16(*status).unwrap();
                            Ok::<_, Infallible>(response)
                        }
                    });
                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        LlmServer {
            base_url: format!("http://127.0.0.1:{port}/"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn sample_issue(key: &str, issue_type: &str) -> Issue {
    Issue {
        id: "10001".into(),
        key: key.into(),
        summary: format!("Summary of {key}"),
        description: "Steps to reproduce".into(),
        issue_type: issue_type.into(),
        status: "Done".into(),
        priority: "High".into(),
        assignee: "Unassigned".into(),
        reporter: "reporter@example.com".into(),
        labels: vec![],
        components: vec![],
        fix_versions: vec!["1.2.0".into()],
        parent: None,
    }
}
