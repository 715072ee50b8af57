use auth::Permission;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How the integration describes its hook.
///
/// Both kinds are invoked the same way: the reply decides whether the request
/// continues. The kind is kept so that configs read back exactly as written.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    /// Observes the request and may reject it.
    #[default]
    Hook,
    /// Answers the request in place of the gateway.
    Hijack,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationHook {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub integration_id: String,
    #[serde(default)]
    pub kind: HookKind,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default)]
    pub url: String,
}

impl IntegrationHook {
    pub fn matches(&self, resource: &str, op: &str) -> bool {
        let listed = |values: &[String], v: &str| values.iter().any(|x| x == "*" || x == v);
        listed(&self.resources, resource) && listed(&self.verbs, op)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Shared key the integration presents to obtain its tokens
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Permissions on the config API
    #[serde(default)]
    pub config_permissions: Vec<Permission>,
    /// Permissions on the public API. The gateway has no public API routes,
    /// so these are only stored and returned.
    #[serde(default)]
    pub api_permissions: Vec<Permission>,
    /// Hooks keyed by id, in registration order
    #[serde(default)]
    pub hooks: IndexMap<String, IntegrationHook>,
}
