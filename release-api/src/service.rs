use crate::diagnostics;
use crate::errors::ApiError;
use crate::handlers::{self, AppState};
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT};
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response};
use percent_encoding::percent_decode_str;
use routing::{Route, RouteMatch, RouteTable};
use shared::http::ResponseBody;
use shared::{gauge, histogram};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteAction {
    Custom,
    Single,
    Event,
    Release,
    ReleaseWithLimit,
    ProjectIssue,
    Diagnostics,
    Test,
}

impl RouteAction {
    fn name(self) -> &'static str {
        match self {
            RouteAction::Custom => "custom",
            RouteAction::Single => "single",
            RouteAction::Event => "event",
            RouteAction::Release => "release",
            RouteAction::ReleaseWithLimit => "release_with_limit",
            RouteAction::ProjectIssue => "project_issue",
            RouteAction::Diagnostics => "diagnostics",
            RouteAction::Test => "test",
        }
    }
}

pub fn route_table() -> RouteTable<RouteAction> {
    RouteTable::new(vec![
        Route::new(Method::POST, "/release-notes/custom", RouteAction::Custom),
        Route::new(Method::POST, "/release-notes/single", RouteAction::Single),
        Route::new(Method::POST, "/release-notes/event", RouteAction::Event),
        Route::new(
            Method::PUT,
            "/release-notes/{proj}/{fixver}/{issuetype}/{max_results}",
            RouteAction::ReleaseWithLimit,
        ),
        Route::new(
            Method::PUT,
            "/release-notes/{proj}/{fixver}/{issuetype}",
            RouteAction::Release,
        ),
        Route::new(
            Method::PUT,
            "/release-notes/{proj}/{issue_key}",
            RouteAction::ProjectIssue,
        ),
        Route::new(
            Method::PUT,
            "/diagnostics/release-notes/{proj}/{fixver}/{issuetype}",
            RouteAction::Diagnostics,
        ),
        Route::new(Method::GET, "/test", RouteAction::Test),
    ])
}

/// Path parameters, percent-decoded.
struct Params(Vec<(String, String)>);

impl Params {
    fn from_match(route_match: &RouteMatch<'_, RouteAction>) -> Self {
        Params(
            route_match
                .params
                .iter()
                .map(|(name, raw)| {
                    let value = percent_decode_str(raw).decode_utf8_lossy().into_owned();
                    (name.clone(), value)
                })
                .collect(),
        )
    }

    fn get(&self, name: &str) -> &str {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map_or("", |(_, v)| v.as_str())
    }

    fn opt(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }
}

pub struct ReleaseNotesService {
    state: Arc<AppState>,
    routes: Arc<RouteTable<RouteAction>>,
}

impl ReleaseNotesService {
    pub fn new(state: Arc<AppState>) -> Self {
        ReleaseNotesService {
            state,
            routes: Arc::new(route_table()),
        }
    }
}

impl Service<Request<Incoming>> for ReleaseNotesService {
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let state = self.state.clone();
        let routes = self.routes.clone();
        Box::pin(async move { Ok(handle(&state, &routes, req).await) })
    }
}

/// Routes one request and renders any `ApiError` as its JSON response.
pub async fn handle<B>(
    state: &Arc<AppState>,
    routes: &RouteTable<RouteAction>,
    req: Request<B>,
) -> Response<ResponseBody>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: std::fmt::Display + Send,
{
    let start = Instant::now();
    gauge!(REQUESTS_INFLIGHT).increment(1.0);

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let resolved = routes
        .resolve(&req)
        .map(|m| (*m.action, Params::from_match(&m)));

    let (handler_name, result) = match resolved {
        Some((action, params)) => {
            tracing::debug!(%method, %path, handler = action.name(), "Matched route");
            // A panicking handler surfaces as a JoinError.
            let result = tokio::spawn(dispatch(state.clone(), action, params, req))
                .await
                .unwrap_or_else(|e| Err(ApiError::Internal(e.to_string())));
            (action.name(), result)
        }
        None if routes.allows_path(&path) => ("none", Err(ApiError::MethodNotAllowed)),
        None => {
            tracing::debug!(%method, %path, "No route matched");
            ("none", Err(ApiError::NotFound))
        }
    };

    let response = result.unwrap_or_else(ApiError::into_response);

    gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    histogram!(
        REQUEST_DURATION,
        "status" => response.status().as_str().to_string(),
        "handler" => handler_name
    )
    .record(start.elapsed().as_secs_f64());
    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Handled request"
    );

    response
}

async fn read_body<B>(req: Request<B>) -> Result<Bytes, ApiError>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    req.into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {e}")))
}

async fn dispatch<B>(
    state: Arc<AppState>,
    action: RouteAction,
    params: Params,
    req: Request<B>,
) -> Result<Response<ResponseBody>, ApiError>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: std::fmt::Display + Send,
{
    let state = &state;
    let body = read_body(req).await?;
    match action {
        RouteAction::Custom => handlers::custom(state, &body).await,
        RouteAction::Single => handlers::single(state, &body).await,
        RouteAction::Event => handlers::event(state, &body).await,
        RouteAction::Release | RouteAction::ReleaseWithLimit => {
            handlers::release(
                state,
                params.get("proj"),
                params.get("fixver"),
                params.get("issuetype"),
                params.opt("max_results"),
                &body,
            )
            .await
        }
        RouteAction::ProjectIssue => {
            handlers::project_issue(state, params.get("proj"), params.get("issue_key"), &body).await
        }
        RouteAction::Diagnostics => {
            diagnostics::diagnostics(
                state,
                params.get("proj"),
                params.get("fixver"),
                params.get("issuetype"),
                &body,
            )
            .await
        }
        RouteAction::Test => handlers::test(state),
    }
}
