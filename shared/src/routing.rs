//! Path pattern matching and path parsing helpers.
//!
//! Patterns support static segments (`/v1/runner`), named parameters
//! (`/v1/runner/{project}`) and a trailing splat (`/v1/runner/*`).

use http::Method;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    Static(String),
    Param(String),
}

#[derive(Debug, Clone)]
pub struct PathPattern {
    segments: Vec<PathSegment>,
    has_trailing_splat: bool,
}

impl PathPattern {
    pub fn parse(path_str: &str) -> Self {
        let mut normalized_path = path_str.trim().trim_matches('/');

        let mut has_trailing_splat = false;
        if normalized_path == "*" {
            has_trailing_splat = true;
            normalized_path = "";
        } else if let Some(stripped) = normalized_path.strip_suffix("/*") {
            has_trailing_splat = true;
            normalized_path = stripped;
        }

        let segments = if normalized_path.is_empty() {
            vec![]
        } else {
            normalized_path
                .split('/')
                .map(|s| {
                    if let Some(stripped) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                        PathSegment::Param(stripped.to_string())
                    } else {
                        PathSegment::Static(s.to_string())
                    }
                })
                .collect()
        };

        PathPattern {
            segments,
            has_trailing_splat,
        }
    }

    /// Matches a request path against this pattern.
    /// Returns the captured parameters on success. Leading and trailing
    /// slashes of the request path are ignored.
    pub fn matches<'a>(&self, request_path: &'a str) -> Option<HashMap<String, &'a str>> {
        let normalized_path = request_path.trim().trim_matches('/');

        let request_segments: Vec<&'a str> = if normalized_path.is_empty() {
            vec![]
        } else {
            normalized_path.split('/').collect()
        };

        let mut params = HashMap::new();

        for (i, seg) in self.segments.iter().enumerate() {
            let req_segment = *request_segments.get(i)?;
            match seg {
                PathSegment::Static(s) if req_segment != s => return None,
                PathSegment::Static(_) => {}
                PathSegment::Param(name) => {
                    params.insert(name.clone(), req_segment);
                }
            }
        }

        if self.has_trailing_splat || self.segments.len() == request_segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct RouteMatch<'a, A> {
    pub params: HashMap<String, &'a str>,
    pub action: &'a A,
}

#[derive(Debug)]
pub struct Route<A> {
    method: Option<Method>,
    path: PathPattern,
    action: A,
}

impl<A> Route<A> {
    /// A route without a method matches every method.
    pub fn new(method: Option<Method>, path: &str, action: A) -> Self {
        Self {
            method,
            path: PathPattern::parse(path),
            action,
        }
    }

    pub fn matches<'a>(&'a self, method: &Method, path: &'a str) -> Option<RouteMatch<'a, A>> {
        if self.method.as_ref().is_some_and(|m| m != method) {
            return None;
        }

        self.path.matches(path).map(|params| RouteMatch {
            params,
            action: &self.action,
        })
    }
}

/// Ordered list of routes. The first route that matches wins.
#[derive(Debug)]
pub struct RouteTable<A> {
    routes: Vec<Route<A>>,
}

impl<A> RouteTable<A> {
    pub fn new(routes: Vec<Route<A>>) -> Self {
        Self { routes }
    }

    pub fn resolve<'a>(&'a self, method: &Method, path: &'a str) -> Option<RouteMatch<'a, A>> {
        self.routes
            .iter()
            .find_map(|route| route.matches(method, path))
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("invalid config url provided - {0}")]
pub struct InvalidConfigPath(pub String);

/// Parts of a config API path `/v1/config/<module>/<type>[/<resource>]`.
#[derive(Debug, PartialEq)]
pub struct ConfigPath {
    /// `single` when a single resource is addressed, `list` otherwise.
    pub op: &'static str,
    pub module: String,
    pub type_name: String,
    pub resource_name: Option<String>,
}

pub fn extract_config_path(path: &str, method: &Method) -> Result<ConfigPath, InvalidConfigPath> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let arr: Vec<&str> = trimmed.split('/').collect();
    if !(4..=5).contains(&arr.len()) {
        return Err(InvalidConfigPath(path.to_string()));
    }

    let resource_name = arr.get(4).map(|s| s.to_string());
    let op = if *method == Method::POST || resource_name.is_some() {
        "single"
    } else {
        "list"
    };

    Ok(ConfigPath {
        op,
        module: arr[2].to_string(),
        type_name: arr[3].to_string(),
        resource_name,
    })
}

fn is_placeholder(segment: &str) -> bool {
    segment == "*" || (segment.starts_with('{') && segment.ends_with('}'))
}

/// Replaces every `{param}` segment of `path` with `*`.
///
/// `indexes` maps the position of each wildcard (counted over all
/// placeholder segments of the path) to the name of the parameter it stands
/// for; replaced positions are added to it.
pub fn replace_path_param(
    path: &str,
    param: &str,
    mut indexes: HashMap<String, String>,
) -> (String, HashMap<String, String>) {
    let needle = format!("{{{param}}}");
    let mut position = 0;

    let segments: Vec<&str> = path
        .split('/')
        .map(|segment| {
            if !is_placeholder(segment) {
                return segment;
            }
            let current = position;
            position += 1;
            if segment == needle {
                indexes.insert(current.to_string(), param.to_string());
                "*"
            } else {
                segment
            }
        })
        .collect();

    (segments.join("/"), indexes)
}

/// Replaces every declared path parameter of `path` with `*`.
pub fn sanitize_path<'a, I>(path: &str, params: I) -> (String, HashMap<String, String>)
where
    I: IntoIterator<Item = &'a str>,
{
    params
        .into_iter()
        .fold((path.to_string(), HashMap::new()), |(path, indexes), param| {
            replace_path_param(&path, param, indexes)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_path() {
        let route = Route::new(None, "/api/test/", "upstream");
        assert!(route.matches(&Method::GET, "/api/test").is_some());
        assert!(route.matches(&Method::GET, "/api/test/").is_some());
        assert!(route.matches(&Method::GET, "/api/test/2").is_none());
        assert!(route.matches(&Method::GET, "/api/").is_none());
    }

    #[test]
    fn test_trailing_splat() {
        let route = Route::new(None, "/api/test/*", "upstream");
        assert!(route.matches(&Method::GET, "/api/test").is_some());
        assert!(route.matches(&Method::GET, "/api/test/extra/more").is_some());
        assert!(route.matches(&Method::GET, "/api/").is_none());
    }

    #[test]
    fn test_dynamic_path() {
        let route = Route::new(Some(Method::POST), "/v1/runner/{project}/secrets/{id}", "apply");

        let matched = route
            .matches(&Method::POST, "/v1/runner/todo/secrets/db-creds")
            .unwrap();
        assert_eq!(matched.params.get("project").copied(), Some("todo"));
        assert_eq!(matched.params.get("id").copied(), Some("db-creds"));
        assert_eq!(matched.action, &"apply");

        assert!(
            route
                .matches(&Method::GET, "/v1/runner/todo/secrets/db-creds")
                .is_none()
        );
    }

    #[test]
    fn test_route_table_first_match_wins() {
        let table = RouteTable::new(vec![
            Route::new(Some(Method::POST), "/s/{id}/root-path", "root"),
            Route::new(Some(Method::POST), "/s/{id}/{key}", "key"),
            Route::new(None, "/*", "catch-all"),
        ]);

        assert_eq!(table.resolve(&Method::POST, "/s/a/root-path").unwrap().action, &"root");
        assert_eq!(table.resolve(&Method::POST, "/s/a/b").unwrap().action, &"key");
        assert_eq!(table.resolve(&Method::GET, "/s/a/b").unwrap().action, &"catch-all");
    }

    #[test]
    fn test_extract_config_path() {
        let parsed = extract_config_path("/v1/config/database/schema", &Method::GET).unwrap();
        assert_eq!(parsed.op, "list");
        assert_eq!(parsed.module, "database");
        assert_eq!(parsed.type_name, "schema");
        assert_eq!(parsed.resource_name, None);

        let parsed = extract_config_path("/v1/config/database/schema", &Method::POST).unwrap();
        assert_eq!(parsed.op, "single");

        let parsed =
            extract_config_path("/v1/config/database/schema/users", &Method::GET).unwrap();
        assert_eq!(parsed.op, "single");
        assert_eq!(parsed.resource_name.as_deref(), Some("users"));

        assert_eq!(
            extract_config_path("/v1/config/database", &Method::GET),
            Err(InvalidConfigPath("/v1/config/database".into()))
        );
        assert!(extract_config_path("/v1/config/a/b/c/d", &Method::GET).is_err());
    }

    #[test]
    fn test_replace_path_param() {
        let (path, indexes) = replace_path_param("/foo/bar", "project", HashMap::new());
        assert_eq!(path, "/foo/bar");
        assert!(indexes.is_empty());

        let (path, indexes) = replace_path_param("/foo/{bar}", "bar", HashMap::new());
        assert_eq!(path, "/foo/*");
        assert_eq!(indexes, HashMap::from([("0".into(), "bar".into())]));

        let (path, indexes) =
            replace_path_param("/foo/{bar}/abc/{bar}/xyz/{bar}/{bar}", "bar", HashMap::new());
        assert_eq!(path, "/foo/*/abc/*/xyz/*/*");
        assert_eq!(indexes.len(), 4);

        let (path, indexes) =
            replace_path_param("/foo/{bar}/abc/{proj}/xyz/{proj}/{bar}", "bar", HashMap::new());
        assert_eq!(path, "/foo/*/abc/{proj}/xyz/{proj}/*");
        assert_eq!(
            indexes,
            HashMap::from([("0".into(), "bar".into()), ("3".into(), "bar".into())])
        );
    }

    #[test]
    fn test_sanitize_path() {
        let (path, indexes) = sanitize_path("/a/b/c", std::iter::empty());
        assert_eq!(path, "/a/b/c");
        assert!(indexes.is_empty());

        let (path, indexes) = sanitize_path("/a/{b}/{c}/d/{b}/{e}", ["b", "c", "e"]);
        assert_eq!(path, "/a/*/*/d/*/*");
        assert_eq!(
            indexes,
            HashMap::from([
                ("0".into(), "b".into()),
                ("1".into(), "c".into()),
                ("2".into(), "b".into()),
                ("3".into(), "e".into()),
            ])
        );
    }
}
