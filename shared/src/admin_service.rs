use crate::http::{ResponseBody, json_response, make_error_response};
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    ready: bool,
}

/// Serves `/health` and `/ready` on the admin listener.
pub struct AdminService<F> {
    is_ready: F,
    version: &'static str,
}

impl<F> AdminService<F>
where
    F: Fn() -> bool,
{
    pub fn new(version: &'static str, is_ready: F) -> Self {
        Self { is_ready, version }
    }
}

impl<F> Service<Request<Incoming>> for AdminService<F>
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let response = route_admin(req.method(), req.uri().path(), (self.is_ready)(), self.version);
        Box::pin(async move { Ok(response) })
    }
}

fn route_admin(
    method: &Method,
    path: &str,
    is_ready: bool,
    version: &'static str,
) -> Response<ResponseBody> {
    if method != Method::GET {
        return make_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    match path {
        "/health" => json_response(
            StatusCode::OK,
            &HealthBody {
                status: "healthy",
                version,
                ready: is_ready,
            },
        ),
        "/ready" if is_ready => json_response(StatusCode::OK, &serde_json::json!({"ready": true})),
        "/ready" => make_error_response(StatusCode::SERVICE_UNAVAILABLE),
        _ => make_error_response(StatusCode::NOT_FOUND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_routes() {
        let health = route_admin(&Method::GET, "/health", false, "1.0.0");
        assert_eq!(health.status(), StatusCode::OK);

        let ready = route_admin(&Method::GET, "/ready", true, "1.0.0");
        assert_eq!(ready.status(), StatusCode::OK);

        let not_ready = route_admin(&Method::GET, "/ready", false, "1.0.0");
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);

        let missing = route_admin(&Method::GET, "/metrics", true, "1.0.0");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let wrong_method = route_admin(&Method::POST, "/health", true, "1.0.0");
        assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
