//! Identity token verification.
//!
//! Identity tokens are HS256 JWTs carrying the signed-in account's profile and
//! an optional `admin` claim.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::Identity;
use crate::errors::AppError;

/// Claims carried by an identity token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Hosted domain of the account, when it belongs to an organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hd: Option<String>,
    #[serde(default)]
    pub admin: bool,
    pub exp: usize,
}

impl From<IdTokenClaims> for Identity {
    fn from(claims: IdTokenClaims) -> Self {
        Identity {
            uid: claims.sub,
            email: claims.email,
            display_name: claims.name,
            photo_url: claims.picture,
            hosted_domain: claims.hd,
            admin_claim: claims.admin,
        }
    }
}

/// Verifies identity tokens against a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    #[cfg(test)]
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            #[cfg(test)]
            secret: secret.to_string(),
        }
    }

    /// Check the signature and expiry and return the identity it vouches for.
    pub fn verify(&self, token: &str) -> Result<Identity, AppError> {
        let data = decode::<IdTokenClaims>(token, &self.key, &self.validation)?;
        if data.claims.sub.trim().is_empty() || data.claims.email.trim().is_empty() {
            return Err(AppError::Unauthorized(
                "Identity token lacks subject or email".to_string(),
            ));
        }
        Ok(data.claims.into())
    }
}

#[cfg(test)]
impl TokenVerifier {
    /// Sign claims with the verifier's secret.
    pub fn issue(&self, claims: &IdTokenClaims) -> String {
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            claims,
            &jsonwebtoken::EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .expect("encode test token")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Claims valid for an hour from now.
    pub fn claims(sub: &str, email: &str) -> IdTokenClaims {
        IdTokenClaims {
            sub: sub.to_string(),
            email: email.to_string(),
            name: Some(format!("User {}", sub)),
            picture: Some(format!("https://avatars.example.org/{}.png", sub)),
            hd: email.split_once('@').map(|(_, domain)| domain.to_string()),
            admin: false,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::claims;
    use super::*;

    #[test]
    fn test_verify_round_trip() {
        let verifier = TokenVerifier::new("secret");
        let token = verifier.issue(&claims("u1", "ada@dubai.bits-pilani.ac.in"));

        let identity = verifier.verify(&token).unwrap();
        assert_eq!(identity.uid, "u1");
        assert_eq!(identity.hosted_domain.as_deref(), Some("dubai.bits-pilani.ac.in"));
        assert!(!identity.admin_claim);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenVerifier::new("one").issue(&claims("u1", "a@b.c"));
        let err = TokenVerifier::new("two").verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = TokenVerifier::new("secret");
        let mut expired = claims("u1", "a@b.c");
        expired.exp = (chrono::Utc::now().timestamp() - 3600) as usize;
        assert!(verifier.verify(&verifier.issue(&expired)).is_err());
    }
}
