use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::config::CredentialConfig;

use super::{Credential, CredentialProvider};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Subject id the signature is bound to
    pub sub: String,
    pub app_id: u64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Signs an HS256 token per subject with the configured application secret
pub struct JwtCredentialProvider {
    app_id: u64,
    encoding_key: Option<EncodingKey>,
    expire_secs: i64,
}

impl JwtCredentialProvider {
    pub fn new(config: &CredentialConfig) -> Self {
        let encoding_key = if config.secret.is_empty() {
            None
        } else {
            Some(EncodingKey::from_secret(config.secret.as_bytes()))
        };

        Self {
            app_id: config.app_id,
            encoding_key,
            expire_secs: config.expire_secs,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.app_id != 0 && self.encoding_key.is_some()
    }
}

impl CredentialProvider for JwtCredentialProvider {
    fn issue(&self, subject_id: &str) -> Option<Credential> {
        let key = match (&self.encoding_key, self.app_id) {
            (Some(key), app_id) if app_id != 0 => key,
            _ => {
                tracing::warn!(
                    subject_id = %subject_id,
                    "Credential provider not configured (app_id or secret missing)"
                );
                return None;
            }
        };

        let iat = chrono::Utc::now().timestamp();
        let claims = CredentialClaims {
            sub: subject_id.to_string(),
            app_id: self.app_id,
            iat,
            exp: iat + self.expire_secs,
        };

        match encode(&Header::default(), &claims, key) {
            Ok(signature) => Some(Credential {
                subject_id: subject_id.to_string(),
                signature,
            }),
            Err(e) => {
                tracing::error!(subject_id = %subject_id, error = %e, "Failed to sign credential");
                None
            }
        }
    }
}
