//! The runner endpoints exposed by the gateway and the permission each one
//! requires.

use http::Method;
use shared::routing::{Route, RouteTable};
use std::collections::HashMap;

/// Where the value of a permission attribute comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrSource {
    /// A named segment of the request path.
    Path(&'static str),
    /// A query parameter, `*` when absent or empty.
    Query(&'static str),
    Const(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndpointKind {
    Forward,
    Logs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerEndpoint {
    pub resource: &'static str,
    pub op: &'static str,
    pub attributes: Vec<(&'static str, AttrSource)>,
    pub kind: EndpointKind,
}

impl RunnerEndpoint {
    fn forward(
        resource: &'static str,
        op: &'static str,
        attributes: Vec<(&'static str, AttrSource)>,
    ) -> Self {
        RunnerEndpoint {
            resource,
            op,
            attributes,
            kind: EndpointKind::Forward,
        }
    }

    /// Builds the attributes checked against the caller's permissions.
    pub fn attributes(
        &self,
        path_params: &HashMap<String, &str>,
        query: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        self.attributes
            .iter()
            .map(|(name, source)| {
                let value = match source {
                    AttrSource::Path(param) => {
                        path_params.get(*param).copied().unwrap_or_default().to_string()
                    }
                    AttrSource::Query(param) => query
                        .get(*param)
                        .filter(|v| !v.is_empty())
                        .cloned()
                        .unwrap_or_else(|| "*".to_string()),
                    AttrSource::Const(value) => value.to_string(),
                };
                (name.to_string(), value)
            })
            .collect()
    }
}

const PROJECT: (&str, AttrSource) = ("project", AttrSource::Path("project"));

/// Ordered endpoint table. More specific paths come before the ones they
/// would otherwise be shadowed by.
pub fn runner_routes() -> RouteTable<RunnerEndpoint> {
    use AttrSource::{Path, Query};

    let secret_modify = || {
        RunnerEndpoint::forward("secret", "modify", vec![PROJECT, ("id", Path("id"))])
    };
    let secret_key_modify = || {
        RunnerEndpoint::forward(
            "secret",
            "modify",
            vec![PROJECT, ("id", Path("id")), ("key", Path("key"))],
        )
    };
    let service_modify = || {
        RunnerEndpoint::forward(
            "service",
            "modify",
            vec![PROJECT, ("id", Path("serviceId")), ("version", Path("version"))],
        )
    };
    let service_role_modify = || {
        RunnerEndpoint::forward(
            "service-role",
            "modify",
            vec![PROJECT, ("serviceId", Path("serviceId")), ("id", Path("roleId"))],
        )
    };

    RouteTable::new(vec![
        // Secrets
        Route::new(
            Some(Method::POST),
            "/v1/runner/{project}/secrets/{id}/root-path",
            secret_modify(),
        ),
        Route::new(
            Some(Method::POST),
            "/v1/runner/{project}/secrets/{id}/{key}",
            secret_key_modify(),
        ),
        Route::new(
            Some(Method::DELETE),
            "/v1/runner/{project}/secrets/{id}/{key}",
            secret_key_modify(),
        ),
        Route::new(
            Some(Method::POST),
            "/v1/runner/{project}/secrets/{id}",
            secret_modify(),
        ),
        Route::new(
            Some(Method::DELETE),
            "/v1/runner/{project}/secrets/{id}",
            secret_modify(),
        ),
        Route::new(
            Some(Method::GET),
            "/v1/runner/{project}/secrets",
            RunnerEndpoint::forward("secret", "read", vec![PROJECT, ("id", Query("id"))]),
        ),
        // Services
        Route::new(
            Some(Method::GET),
            "/v1/runner/{project}/services/logs",
            RunnerEndpoint {
                resource: "service",
                op: "read",
                attributes: vec![PROJECT],
                kind: EndpointKind::Logs,
            },
        ),
        Route::new(
            Some(Method::GET),
            "/v1/runner/{project}/services/status",
            RunnerEndpoint::forward("service", "read", vec![PROJECT]),
        ),
        Route::new(
            Some(Method::POST),
            "/v1/runner/{project}/services/{serviceId}/{version}",
            service_modify(),
        ),
        Route::new(
            Some(Method::DELETE),
            "/v1/runner/{project}/services/{serviceId}/{version}",
            service_modify(),
        ),
        Route::new(
            Some(Method::GET),
            "/v1/runner/{project}/services",
            RunnerEndpoint::forward(
                "service",
                "read",
                vec![PROJECT, ("id", Query("serviceId")), ("version", Query("version"))],
            ),
        ),
        // Service routes
        Route::new(
            Some(Method::POST),
            "/v1/runner/{project}/service-routes/{serviceId}",
            RunnerEndpoint::forward(
                "service-route",
                "modify",
                vec![PROJECT, ("id", Path("serviceId"))],
            ),
        ),
        Route::new(
            Some(Method::GET),
            "/v1/runner/{project}/service-routes",
            RunnerEndpoint::forward("service-route", "read", vec![PROJECT, ("id", Query("id"))]),
        ),
        // Service roles
        Route::new(
            Some(Method::POST),
            "/v1/runner/{project}/service-roles/{serviceId}/{roleId}",
            service_role_modify(),
        ),
        Route::new(
            Some(Method::DELETE),
            "/v1/runner/{project}/service-roles/{serviceId}/{roleId}",
            service_role_modify(),
        ),
        Route::new(
            Some(Method::GET),
            "/v1/runner/{project}/service-roles",
            RunnerEndpoint::forward(
                "service-role",
                "read",
                vec![PROJECT, ("serviceId", Query("id")), ("id", Query("roleId"))],
            ),
        ),
        // Everything else needs full runner access.
        Route::new(
            None,
            "/v1/runner/*",
            RunnerEndpoint::forward("runner", "modify", vec![]),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(method: Method, path: &str, query: &[(&str, &str)]) -> (RunnerEndpoint, HashMap<String, String>) {
        let routes = runner_routes();
        let query: HashMap<String, String> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let matched = routes.resolve(&method, path).unwrap();
        let attrs = matched.action.attributes(&matched.params, &query);
        (matched.action.clone(), attrs)
    }

    #[test]
    fn test_secret_routes() {
        let (endpoint, attrs) = resolve(Method::POST, "/v1/runner/p1/secrets/db/root-path", &[]);
        assert_eq!((endpoint.resource, endpoint.op), ("secret", "modify"));
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["id"], "db");

        let (_, attrs) = resolve(Method::POST, "/v1/runner/p1/secrets/db/password", &[]);
        assert_eq!(attrs["key"], "password");
        assert_eq!(attrs["project"], "p1");

        let (endpoint, attrs) = resolve(Method::GET, "/v1/runner/p1/secrets", &[]);
        assert_eq!(endpoint.op, "read");
        assert_eq!(attrs["id"], "*");

        let (_, attrs) = resolve(Method::GET, "/v1/runner/p1/secrets", &[("id", "db")]);
        assert_eq!(attrs["id"], "db");
    }

    #[test]
    fn test_service_routes() {
        let (endpoint, attrs) = resolve(Method::GET, "/v1/runner/p1/services", &[("serviceId", "api")]);
        assert_eq!(endpoint.resource, "service");
        assert_eq!(attrs["id"], "api");
        // The version falls back on its own.
        assert_eq!(attrs["version"], "*");

        let (_, attrs) = resolve(
            Method::GET,
            "/v1/runner/p1/services",
            &[("serviceId", "api"), ("version", "v2")],
        );
        assert_eq!(attrs["version"], "v2");

        let (endpoint, _) = resolve(Method::GET, "/v1/runner/p1/services/logs", &[]);
        assert_eq!(endpoint.kind, EndpointKind::Logs);

        let (endpoint, attrs) = resolve(Method::GET, "/v1/runner/p1/services/status", &[]);
        assert_eq!(endpoint.kind, EndpointKind::Forward);
        assert_eq!(attrs.len(), 1);

        let (endpoint, attrs) = resolve(Method::DELETE, "/v1/runner/p1/services/api/v1", &[]);
        assert_eq!(endpoint.op, "modify");
        assert_eq!(attrs["version"], "v1");
    }

    #[test]
    fn test_service_role_routes() {
        let (endpoint, attrs) = resolve(
            Method::GET,
            "/v1/runner/p1/service-roles",
            &[("id", "api"), ("roleId", "reader")],
        );
        assert_eq!(endpoint.resource, "service-role");
        assert_eq!(attrs["serviceId"], "api");
        assert_eq!(attrs["id"], "reader");

        let (_, attrs) = resolve(Method::POST, "/v1/runner/p1/service-roles/api/writer", &[]);
        assert_eq!(attrs["serviceId"], "api");
        assert_eq!(attrs["id"], "writer");
    }

    #[test]
    fn test_catch_all() {
        let (endpoint, attrs) = resolve(Method::PUT, "/v1/runner/p1/secrets/db", &[]);
        assert_eq!((endpoint.resource, endpoint.op), ("runner", "modify"));
        assert!(attrs.is_empty());

        let (endpoint, _) = resolve(Method::GET, "/v1/runner/cluster-type", &[]);
        assert_eq!(endpoint.resource, "runner");
    }
}
