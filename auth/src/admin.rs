use crate::errors::AuthError;
use crate::jwt::{Claims, JwtManager};
use crate::metrics_defs::{TOKEN_CHECKS, TOKENS_ISSUED};
use crate::types::{AuthSecret, Permission};
use parking_lot::RwLock;
use serde_json::{Value, json};
use shared::counter;
use shared::model::RequestParams;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_INTEGRATION: &str = "integration";

/// Id placed in tokens the gateway issues to itself.
pub const INTERNAL_USER_ID: &str = "gateway-internal";

const INTERNAL_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);
const INTEGRATION_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Looks up the config permissions granted to an integration.
pub trait PermissionSource: Send + Sync {
    fn permissions(&self, integration_id: &str) -> Option<Vec<Permission>>;
}

pub struct AdminManager {
    jwt: JwtManager,
    permissions: RwLock<Option<Arc<dyn PermissionSource>>>,
}

impl AdminManager {
    pub fn new(secrets: Vec<AuthSecret>) -> Self {
        AdminManager {
            jwt: JwtManager::new(secrets),
            permissions: RwLock::new(None),
        }
    }

    /// Integrations are registered after the admin manager exists, so the
    /// source of their permissions is attached late.
    pub fn set_permission_source(&self, source: Arc<dyn PermissionSource>) {
        *self.permissions.write() = Some(source);
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    /// Checks that the token may perform `op` on `resource`.
    ///
    /// Admins pass every check. Integrations must hold a matching config
    /// permission. The returned params carry the token claims.
    pub fn is_token_valid(
        &self,
        token: &str,
        resource: &str,
        op: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<RequestParams, AuthError> {
        let result = self.check(token, resource, op, attributes);

        let outcome = match &result {
            Ok(_) => "allowed",
            Err(e) if e.status().is_server_error() => "error",
            Err(_) => "denied",
        };
        counter!(TOKEN_CHECKS, "resource" => resource.to_string(), "outcome" => outcome)
            .increment(1);

        let claims = result?;
        Ok(RequestParams {
            resource: resource.to_string(),
            op: op.to_string(),
            attributes: attributes.clone(),
            claims,
            ..Default::default()
        })
    }

    fn check(
        &self,
        token: &str,
        resource: &str,
        op: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<Claims, AuthError> {
        let claims = self.jwt.parse(token)?;

        let role = claims.get("role").and_then(Value::as_str).unwrap_or_default();
        match role {
            ROLE_ADMIN => Ok(claims),
            ROLE_INTEGRATION => {
                let id = claims.get("id").and_then(Value::as_str).unwrap_or_default();
                let forbidden = || AuthError::Forbidden {
                    resource: resource.to_string(),
                    op: op.to_string(),
                };

                let source = self.permissions.read().clone().ok_or_else(forbidden)?;
                let permissions = source.permissions(id).ok_or_else(forbidden)?;
                if permissions
                    .iter()
                    .any(|p| p.allows(resource, op, attributes))
                {
                    Ok(claims)
                } else {
                    tracing::debug!(integration = id, resource, op, "integration lacks permission");
                    Err(forbidden())
                }
            }
            other => Err(AuthError::UnknownRole(other.to_string())),
        }
    }

    /// Short lived admin token the gateway uses toward internal services.
    pub fn internal_access_token(&self) -> Result<String, AuthError> {
        self.issue(INTERNAL_USER_ID, ROLE_ADMIN, INTERNAL_TOKEN_TTL)
    }

    pub fn integration_token(&self, integration_id: &str) -> Result<String, AuthError> {
        self.issue(integration_id, ROLE_INTEGRATION, INTEGRATION_TOKEN_TTL)
    }

    fn issue(&self, id: &str, role: &str, ttl: Duration) -> Result<String, AuthError> {
        let exp = SystemTime::now()
            .checked_add(ttl)
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut claims = Claims::new();
        claims.insert("id".into(), json!(id));
        claims.insert("role".into(), json!(role));
        claims.insert("exp".into(), json!(exp));

        let token = self.jwt.sign(&claims)?;
        counter!(TOKENS_ISSUED, "role" => role.to_string()).increment(1);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticPermissions(HashMap<String, Vec<Permission>>);

    impl PermissionSource for StaticPermissions {
        fn permissions(&self, integration_id: &str) -> Option<Vec<Permission>> {
            self.0.get(integration_id).cloned()
        }
    }

    fn manager() -> AdminManager {
        AdminManager::new(vec![AuthSecret::hs256("main", "some-secret")])
    }

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_admin_passes_everything() {
        let admin = manager();
        let token = admin.internal_access_token().unwrap();

        let params = admin
            .is_token_valid(&token, "runner", "modify", &attrs(&[("project", "p1")]))
            .unwrap();
        assert_eq!(params.resource, "runner");
        assert_eq!(params.op, "modify");
        assert_eq!(params.attributes["project"], "p1");
        assert_eq!(params.claims["role"], ROLE_ADMIN);
        assert_eq!(params.claims["id"], INTERNAL_USER_ID);
    }

    #[test]
    fn test_missing_or_bad_token() {
        let admin = manager();
        let err = admin
            .is_token_valid("", "runner", "read", &HashMap::new())
            .unwrap_err();
        assert_eq!(err.status(), http::StatusCode::UNAUTHORIZED);

        let err = admin
            .is_token_valid("not-a-jwt", "runner", "read", &HashMap::new())
            .unwrap_err();
        assert_eq!(err.status(), http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_integration_permissions() {
        let admin = manager();
        let token = admin.integration_token("billing").unwrap();

        // No permission source attached yet.
        let err = admin
            .is_token_valid(&token, "integration-hook", "modify", &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, AuthError::Forbidden { .. }));

        admin.set_permission_source(Arc::new(StaticPermissions(HashMap::from([(
            "billing".to_string(),
            vec![Permission {
                resources: vec!["integration-hook".into()],
                verbs: vec!["*".into()],
                attributes: HashMap::from([("integration".into(), vec!["billing".into()])]),
            }],
        )]))));

        let ok = attrs(&[("integration", "billing"), ("hook", "h1")]);
        let params = admin
            .is_token_valid(&token, "integration-hook", "modify", &ok)
            .unwrap();
        assert_eq!(params.claims["role"], ROLE_INTEGRATION);

        let other = attrs(&[("integration", "crm")]);
        let err = admin
            .is_token_valid(&token, "integration-hook", "modify", &other)
            .unwrap_err();
        assert_eq!(err.status(), http::StatusCode::FORBIDDEN);

        let unknown = admin.integration_token("unknown").unwrap();
        assert!(
            admin
                .is_token_valid(&unknown, "integration-hook", "modify", &ok)
                .is_err()
        );
    }

    #[test]
    fn test_unknown_role() {
        let admin = manager();
        let claims = json!({"id": "u1", "role": "user"});
        let token = admin.jwt().sign(claims.as_object().unwrap()).unwrap();

        let err = admin
            .is_token_valid(&token, "runner", "read", &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownRole(role) if role == "user"));
    }
}
