use crate::errors::AuthError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum JwtAlg {
    #[serde(rename = "HS256")]
    HS256,
    #[serde(rename = "RS256")]
    RS256,
    #[serde(rename = "RS256_PUBLIC")]
    RS256Public,
    #[serde(rename = "JWK_URL")]
    JwkUrl,
}

/// A confidential value, given inline or by reference.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SecretValue {
    Plain(String),
    Source(SecretSource),
}

impl SecretValue {
    pub fn resolve(&self) -> Result<String, AuthError> {
        match self {
            SecretValue::Plain(value) => Ok(value.clone()),
            SecretValue::Source(source) => source.resolve(),
        }
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        SecretValue::Plain(value.to_string())
    }
}

/// Where a confidential value is read from.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretSource {
    /// Selects a key of a secret in the secret manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeyRef>,

    /// Selects the value of an environment variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_ref: Option<EnvRef>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
    /// Secret manager to read from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EnvRef {
    pub name: String,
}

impl SecretSource {
    pub fn resolve(&self) -> Result<String, AuthError> {
        if let Some(env_ref) = &self.env_ref {
            return std::env::var(&env_ref.name)
                .map_err(|_| AuthError::SecretNotFound(format!("env:{}", env_ref.name)));
        }

        match &self.secret_key_ref {
            // Secret managers live outside the gateway.
            Some(key_ref) => Err(AuthError::UnsupportedSecretSource(format!(
                "{}/{}",
                key_ref.name, key_ref.key
            ))),
            None => Err(AuthError::SecretNotFound("empty secret source".into())),
        }
    }
}

/// A key used to sign or verify tokens.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSecret {
    /// Marks the secret used for signing new tokens
    #[serde(default)]
    pub is_primary: bool,

    /// Value of the `kid` header of tokens signed with this secret
    #[serde(default)]
    pub kid: String,

    pub alg: JwtAlg,

    /// Shared secret for HS256
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SecretValue>,

    /// RSA public key in PEM format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<SecretValue>,

    /// RSA private key in PEM format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<SecretValue>,

    /// Allowed values of the `aud` claim. Empty means unchecked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_audiences: Vec<String>,

    /// Allowed values of the `iss` claim. Empty means unchecked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_issuers: Vec<String>,
}

impl AuthSecret {
    pub fn hs256(kid: &str, value: &str) -> Self {
        AuthSecret {
            is_primary: false,
            kid: kid.to_string(),
            alg: JwtAlg::HS256,
            value: Some(value.into()),
            public_key: None,
            private_key: None,
            allowed_audiences: Vec::new(),
            allowed_issuers: Vec::new(),
        }
    }
}

/// Grants a principal some verbs on some resources.
///
/// `*` in `resources` or `verbs` matches anything. Every attribute listed
/// here must be present on the request with one of the listed values (or
/// the permission must list `*`).
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Permission {
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Vec<String>>,
}

impl Permission {
    pub fn allows(&self, resource: &str, op: &str, attributes: &HashMap<String, String>) -> bool {
        let listed = |values: &[String], v: &str| values.iter().any(|x| x == "*" || x == v);

        if !listed(&self.resources, resource) || !listed(&self.verbs, op) {
            return false;
        }

        self.attributes.iter().all(|(key, allowed)| {
            attributes
                .get(key)
                .is_some_and(|value| listed(allowed, value))
        })
    }
}
