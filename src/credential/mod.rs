//! Per-subject credentials presented when entering a room

mod jwt;

pub use jwt::{CredentialClaims, JwtCredentialProvider};

use serde::Serialize;

/// Signature issued for one subject id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub subject_id: String,
    #[serde(skip_serializing)]
    pub signature: String,
}

/// Issues credentials at handle-creation time.
///
/// Returns `None` (never an error) when the provider is not configured;
/// callers skip the subject in that case.
pub trait CredentialProvider: Send + Sync {
    fn issue(&self, subject_id: &str) -> Option<Credential>;
}

/// Issues an empty signature for every subject. For transports that
/// authenticate nothing, such as the loopback transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousCredentialProvider;

impl CredentialProvider for AnonymousCredentialProvider {
    fn issue(&self, subject_id: &str) -> Option<Credential> {
        Some(Credential {
            subject_id: subject_id.to_string(),
            signature: String::new(),
        })
    }
}
