use http::Method;
use std::collections::HashMap;

#[derive(Debug)]
enum PathSegment {
    Static(String),
    Param(String),
}

#[derive(Debug)]
struct PathPattern {
    segments: Vec<PathSegment>,
}

impl PathPattern {
    /// Parses a path pattern such as "/release-notes/{proj}/{issue_key}".
    /// Segments wrapped in braces capture the request segment under that name.
    pub fn parse(pattern: &str) -> Self {
        let normalized = pattern.trim().trim_matches('/');

        let segments = if normalized.is_empty() {
            vec![]
        } else {
            normalized
                .split('/')
                .map(|s| {
                    match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                        Some(name) => PathSegment::Param(name.to_string()),
                        None => PathSegment::Static(s.to_string()),
                    }
                })
                .collect()
        };

        PathPattern { segments }
    }

    /// Returns the captured params if the request path has exactly as many
    /// segments as the pattern and every static segment is equal.
    fn matches<'a>(&self, request_path: &'a str) -> Option<HashMap<String, &'a str>> {
        let normalized = request_path.trim().trim_matches('/');
        let request_segments: Vec<&'a str> = if normalized.is_empty() {
            vec![]
        } else {
            normalized.split('/').collect()
        };

        if request_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, segment) in self.segments.iter().zip(request_segments) {
            match pattern {
                PathSegment::Static(s) if s == segment => {}
                PathSegment::Static(_) => return None,
                PathSegment::Param(_) if segment.is_empty() => return None,
                PathSegment::Param(name) => {
                    params.insert(name.clone(), segment);
                }
            }
        }

        Some(params)
    }
}

#[derive(Debug, PartialEq)]
pub struct RouteMatch<'a, A> {
    pub params: HashMap<String, &'a str>,
    pub action: &'a A,
}

impl<A> RouteMatch<'_, A> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).copied()
    }
}

#[derive(Debug)]
pub struct Route<A> {
    method: Method,
    path: PathPattern,
    action: A,
}

impl<A> Route<A> {
    pub fn new(method: Method, path: &str, action: A) -> Self {
        Self {
            method,
            path: PathPattern::parse(path),
            action,
        }
    }

    /// Returns Some(RouteMatch) if both the method and the path match.
    /// Trailing slashes on the request path are ignored.
    pub fn matches<'a>(&'a self, method: &Method, path: &'a str) -> Option<RouteMatch<'a, A>> {
        if &self.method != method {
            return None;
        }

        let params = self.path.matches(path)?;
        Some(RouteMatch {
            params,
            action: &self.action,
        })
    }
}

/// Ordered route table. The first matching route wins, so more specific
/// patterns must be registered before overlapping generic ones.
pub struct RouteTable<A> {
    routes: Vec<Route<A>>,
}

impl<A> RouteTable<A> {
    pub fn new(routes: Vec<Route<A>>) -> Self {
        Self { routes }
    }

    pub fn resolve<'a, B>(&'a self, request: &'a http::Request<B>) -> Option<RouteMatch<'a, A>> {
        let path = request.uri().path();
        self.routes
            .iter()
            .find_map(|route| route.matches(request.method(), path))
    }

    /// True if some route accepts this path under a different method.
    pub fn allows_path(&self, path: &str) -> bool {
        self.routes.iter().any(|route| route.path.matches(path).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_path() {
        let route = Route::new(Method::POST, "/release-notes/custom/", "custom");
        assert!(route.matches(&Method::POST, "/release-notes/custom").is_some());
        assert!(
            route.matches(&Method::POST, "/release-notes/custom/").is_some(),
            "trailing slash is ignored"
        );
        assert!(route.matches(&Method::GET, "/release-notes/custom").is_none());
        assert!(route.matches(&Method::POST, "/release-notes/custom/2").is_none());
        assert!(route.matches(&Method::POST, "/release-notes").is_none());
    }

    #[test]
    fn test_dynamic_path() {
        let route = Route::new(Method::PUT, "/release-notes/{proj}/{issue_key}", "single");

        let route_match = route
            .matches(&Method::PUT, "/release-notes/IP/IP-51180")
            .unwrap();
        assert_eq!(route_match.param("proj"), Some("IP"));
        assert_eq!(route_match.param("issue_key"), Some("IP-51180"));
        assert_eq!(route_match.action, &"single");

        assert!(route.matches(&Method::PUT, "/release-notes/IP//").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let table = RouteTable::new(vec![
            Route::new(Method::POST, "/release-notes/custom", "custom"),
            Route::new(Method::POST, "/release-notes/{anything}", "generic"),
        ]);

        let request = http::Request::post("/release-notes/custom").body(()).unwrap();
        assert_eq!(table.resolve(&request).unwrap().action, &"custom");

        let request = http::Request::post("/release-notes/other").body(()).unwrap();
        assert_eq!(table.resolve(&request).unwrap().action, &"generic");

        let request = http::Request::get("/release-notes/other").body(()).unwrap();
        assert!(table.resolve(&request).is_none());
        assert!(table.allows_path("/release-notes/other"));
        assert!(!table.allows_path("/nowhere"));
    }

    #[test]
    fn test_pattern_parsing() {
        assert_eq!(PathPattern::parse("").segments.len(), 0);
        assert_eq!(PathPattern::parse("/test").segments.len(), 1);

        let pattern = PathPattern::parse("/release-notes/{proj}/{fixver}/{issuetype}");
        assert_eq!(pattern.segments.len(), 4);
        assert!(matches!(pattern.segments[1], PathSegment::Param(ref p) if p == "proj"));
    }
}
