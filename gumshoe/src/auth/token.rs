//! Signed link tokens.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use super::AuthError;

/// The signed part of a token, in canonical field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignaturePayload<'a> {
    pub email: &'a str,
    pub expires: i64,
}

impl SignaturePayload<'_> {
    /// Canonical JSON, `{"email":..,"expires":..}`.
    pub fn canonical_json(&self) -> Result<String, AuthError> {
        serde_json::to_string(self).map_err(|e| AuthError::Signing(e.to_string()))
    }
}

/// A stateless access token carried in link query parameters.
///
/// Validity is recomputed from `(email, expires)` and the server secret on
/// every use; tokens are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedToken {
    pub email: String,
    /// Expiry as Unix epoch milliseconds (UTC).
    pub expires: i64,
    pub signature: String,
}

impl SignedToken {
    pub fn payload(&self) -> SignaturePayload<'_> {
        SignaturePayload {
            email: &self.email,
            expires: self.expires,
        }
    }

    /// Parse `email=..&expires=..&signature=..`. Unknown, repeated or
    /// missing fields are rejected.
    pub fn from_query(query: &str) -> Result<Self, AuthError> {
        let query = query.strip_prefix('?').unwrap_or(query);

        let mut email = None;
        let mut expires = None;
        let mut signature = None;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match &*key {
                "email" => &mut email,
                "expires" => &mut expires,
                "signature" => &mut signature,
                other => {
                    return Err(AuthError::MalformedToken(format!(
                        "unexpected field '{other}'"
                    )));
                }
            };
            if slot.replace(value.into_owned()).is_some() {
                return Err(AuthError::MalformedToken(format!("repeated field '{key}'")));
            }
        }

        let email = email.ok_or_else(|| AuthError::MalformedToken("missing email".into()))?;
        let expires = expires
            .ok_or_else(|| AuthError::MalformedToken("missing expires".into()))?
            .parse::<i64>()
            .map_err(|e| AuthError::MalformedToken(format!("invalid expires: {e}")))?;
        let signature =
            signature.ok_or_else(|| AuthError::MalformedToken("missing signature".into()))?;

        Ok(Self {
            email,
            expires,
            signature,
        })
    }

    /// Encode as link query parameters (without the leading `?`).
    pub fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("email", &self.email)
            .append_pair("expires", &self.expires.to_string())
            .append_pair("signature", &self.signature)
            .finish()
    }
}
