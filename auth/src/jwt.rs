use crate::errors::AuthError;
use crate::types::{AuthSecret, JwtAlg};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use serde_json::{Map, Value};

pub type Claims = Map<String, Value>;

pub fn signing_algorithm(alg: JwtAlg) -> Algorithm {
    match alg {
        JwtAlg::HS256 => Algorithm::HS256,
        JwtAlg::RS256 | JwtAlg::RS256Public | JwtAlg::JwkUrl => Algorithm::RS256,
    }
}

fn required(value: &Option<crate::types::SecretValue>, what: &str) -> Result<String, AuthError> {
    value
        .as_ref()
        .ok_or_else(|| AuthError::SecretNotFound(what.to_string()))?
        .resolve()
}

pub fn signing_key(secret: &AuthSecret) -> Result<EncodingKey, AuthError> {
    match secret.alg {
        JwtAlg::HS256 => Ok(EncodingKey::from_secret(
            required(&secret.value, "value")?.as_bytes(),
        )),
        JwtAlg::RS256 => Ok(EncodingKey::from_rsa_pem(
            required(&secret.private_key, "privateKey")?.as_bytes(),
        )?),
        alg => Err(AuthError::UnsupportedAlgorithm(alg)),
    }
}

pub fn verifying_key(secret: &AuthSecret) -> Result<DecodingKey, AuthError> {
    match secret.alg {
        JwtAlg::HS256 => Ok(DecodingKey::from_secret(
            required(&secret.value, "value")?.as_bytes(),
        )),
        JwtAlg::RS256 | JwtAlg::RS256Public => Ok(DecodingKey::from_rsa_pem(
            required(&secret.public_key, "publicKey")?.as_bytes(),
        )?),
        alg => Err(AuthError::UnsupportedAlgorithm(alg)),
    }
}

/// Checks a string or array claim against a list of allowed values.
pub fn verify_claim(claim: &Value, allowed: &[String]) -> Result<(), AuthError> {
    let found = match claim {
        Value::String(s) => allowed.iter().any(|a| a == s),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| allowed.iter().any(|a| a == s)),
        _ => return Err(AuthError::InvalidClaimType),
    };

    if found {
        Ok(())
    } else {
        Err(AuthError::ClaimMismatch)
    }
}

/// Signs and parses tokens with a fixed set of secrets.
#[derive(Clone, Debug)]
pub struct JwtManager {
    secrets: Vec<AuthSecret>,
}

impl JwtManager {
    pub fn new(secrets: Vec<AuthSecret>) -> Self {
        Self { secrets }
    }

    /// The secret flagged as primary, or the first one.
    pub fn primary_secret(&self) -> Result<&AuthSecret, AuthError> {
        self.secrets
            .iter()
            .find(|s| s.is_primary)
            .or_else(|| self.secrets.first())
            .ok_or(AuthError::NoSecrets)
    }

    pub fn secret_for_kid(&self, kid: &str) -> Option<&AuthSecret> {
        self.secrets.iter().find(|s| s.kid == kid)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        let secret = self.primary_secret()?;
        let mut header = Header::new(signing_algorithm(secret.alg));
        if !secret.kid.is_empty() {
            header.kid = Some(secret.kid.clone());
        }

        Ok(encode(&header, claims, &signing_key(secret)?)?)
    }

    /// Verifies the token and returns its claims.
    ///
    /// A token carrying a `kid` header is only checked against the secret
    /// with that kid. Tokens without one are tried against every secret.
    pub fn parse(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let header = decode_header(token)?;
        let candidates: Vec<&AuthSecret> = match header.kid.as_deref() {
            Some(kid) if !kid.is_empty() => vec![
                self.secret_for_kid(kid)
                    .ok_or_else(|| AuthError::UnknownKid(kid.to_string()))?,
            ],
            _ => self.secrets.iter().collect(),
        };

        let mut last_err = AuthError::NoSecrets;
        for secret in candidates {
            match parse_with(token, secret) {
                Ok(claims) => return Ok(claims),
                Err(e) => last_err = e,
            }
        }

        Err(last_err)
    }
}

fn parse_with(token: &str, secret: &AuthSecret) -> Result<Claims, AuthError> {
    let key = verifying_key(secret)?;

    let mut validation = Validation::new(signing_algorithm(secret.alg));
    validation.required_spec_claims.clear();
    // Audience and issuer are checked against the secret's allow lists below.
    validation.validate_aud = false;

    let claims = decode::<Claims>(token, &key, &validation)?.claims;

    if !secret.allowed_audiences.is_empty() {
        let aud = claims.get("aud").unwrap_or(&Value::Null);
        verify_claim(aud, &secret.allowed_audiences)?;
    }

    if !secret.allowed_issuers.is_empty() {
        let iss = claims.get("iss").unwrap_or(&Value::Null);
        verify_claim(iss, &secret.allowed_issuers)?;
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_signing_algorithm() {
        assert_eq!(signing_algorithm(JwtAlg::HS256), Algorithm::HS256);
        assert_eq!(signing_algorithm(JwtAlg::RS256), Algorithm::RS256);
        assert_eq!(signing_algorithm(JwtAlg::RS256Public), Algorithm::RS256);
        assert_eq!(signing_algorithm(JwtAlg::JwkUrl), Algorithm::RS256);
    }

    #[test]
    fn test_primary_secret() {
        let manager = JwtManager::new(vec![]);
        assert!(matches!(manager.primary_secret(), Err(AuthError::NoSecrets)));

        let manager = JwtManager::new(vec![
            AuthSecret::hs256("a", "one"),
            AuthSecret::hs256("b", "two"),
        ]);
        assert_eq!(manager.primary_secret().unwrap().kid, "a");

        let mut primary = AuthSecret::hs256("c", "three");
        primary.is_primary = true;
        let manager = JwtManager::new(vec![AuthSecret::hs256("a", "one"), primary]);
        assert_eq!(manager.primary_secret().unwrap().kid, "c");
        assert_eq!(manager.secret_for_kid("a").unwrap().kid, "a");
        assert!(manager.secret_for_kid("zzz").is_none());
    }

    #[test]
    fn test_verify_claim() {
        let allowed = vec!["console".to_string(), "cli".to_string()];

        assert!(verify_claim(&json!("cli"), &allowed).is_ok());
        assert!(verify_claim(&json!(["web", "console"]), &allowed).is_ok());
        assert!(matches!(
            verify_claim(&json!("web"), &allowed),
            Err(AuthError::ClaimMismatch)
        ));
        assert!(matches!(
            verify_claim(&json!(["web"]), &allowed),
            Err(AuthError::ClaimMismatch)
        ));
        assert!(matches!(
            verify_claim(&json!(42), &allowed),
            Err(AuthError::InvalidClaimType)
        ));
    }

    #[test]
    fn test_sign_and_parse_by_kid() {
        let signer = JwtManager::new(vec![AuthSecret::hs256("k2", "second")]);
        let token = signer.sign(&claims(json!({"id": "alice", "role": "admin"}))).unwrap();

        let verifier = JwtManager::new(vec![
            AuthSecret::hs256("k1", "first"),
            AuthSecret::hs256("k2", "second"),
        ]);
        let parsed = verifier.parse(&token).unwrap();
        assert_eq!(parsed["id"], "alice");

        let wrong = JwtManager::new(vec![AuthSecret::hs256("k1", "first")]);
        assert!(matches!(wrong.parse(&token), Err(AuthError::UnknownKid(_))));
    }

    #[test]
    fn test_parse_without_kid_tries_all_secrets() {
        let signer = JwtManager::new(vec![AuthSecret::hs256("", "second")]);
        let token = signer.sign(&claims(json!({"id": "bob"}))).unwrap();

        let verifier = JwtManager::new(vec![
            AuthSecret::hs256("", "first"),
            AuthSecret::hs256("", "second"),
        ]);
        assert_eq!(verifier.parse(&token).unwrap()["id"], "bob");

        let wrong = JwtManager::new(vec![AuthSecret::hs256("", "first")]);
        assert!(matches!(wrong.parse(&token), Err(AuthError::InvalidToken(_))));
        assert!(matches!(wrong.parse(""), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new(vec![AuthSecret::hs256("k", "secret")]);
        let token = manager.sign(&claims(json!({"id": "x", "exp": 1000}))).unwrap();
        assert!(matches!(manager.parse(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_audience_and_issuer_checks() {
        let mut secret = AuthSecret::hs256("k", "secret");
        secret.allowed_audiences = vec!["console".into()];
        secret.allowed_issuers = vec!["gateway".into()];
        let manager = JwtManager::new(vec![secret]);

        let ok = manager
            .sign(&claims(json!({"aud": ["console"], "iss": "gateway"})))
            .unwrap();
        assert!(manager.parse(&ok).is_ok());

        let bad_aud = manager
            .sign(&claims(json!({"aud": "web", "iss": "gateway"})))
            .unwrap();
        assert!(matches!(manager.parse(&bad_aud), Err(AuthError::ClaimMismatch)));

        let missing_iss = manager.sign(&claims(json!({"aud": "console"}))).unwrap();
        assert!(matches!(
            manager.parse(&missing_iss),
            Err(AuthError::InvalidClaimType)
        ));
    }

    #[test]
    fn test_cannot_sign_with_public_key_only() {
        let secret = AuthSecret {
            alg: JwtAlg::RS256Public,
            ..AuthSecret::hs256("k", "unused")
        };
        let manager = JwtManager::new(vec![secret]);
        assert!(matches!(
            manager.sign(&Claims::new()),
            Err(AuthError::UnsupportedAlgorithm(JwtAlg::RS256Public))
        ));
    }
}
