//! Third-party identity provider seam.
//!
//! The login flow only needs "turn this bearer credential into a verified
//! e-mail". [`FirebaseIdentityProvider`] does that for Firebase Authentication
//! ID tokens by checking the RS256 signature against Google's published JWKS.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

use super::models::VerifiedIdentity;

/// Google's JWKS for Firebase ID tokens
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// How long fetched signing keys are trusted before refetching
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cached keys younger than this are not refetched for an unknown key id
const JWKS_MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

/// Timeout of a single JWKS fetch
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity provider errors
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Credential definitively invalid; retrying will not help
    #[error("Credential rejected: {0}")]
    Rejected(String),

    /// Transient failure (network, key fetch, not configured)
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Verifies provider-issued credentials
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a credential and return the identity it proves
    async fn verify_id_token(&self, token: &str) -> Result<VerifiedIdentity, ProviderError>;

    /// Whether the provider can verify anything at all
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    email: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Firebase Authentication ID token verifier
pub struct FirebaseIdentityProvider {
    project_id: String,
    jwks_url: String,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
    refresh: bool,
}

impl FirebaseIdentityProvider {
    /// Create a verifier for a Firebase project
    ///
    /// # Arguments
    ///
    /// * `project_id` - Firebase project id (expected `aud`)
    /// * `jwks_url` - Override of the key endpoint, `None` for Google's
    pub fn new(project_id: &str, jwks_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            project_id: project_id.to_string(),
            jwks_url: jwks_url.unwrap_or_else(|| FIREBASE_JWKS_URL.to_string()),
            http,
            cache: RwLock::new(None),
            refresh: true,
        }
    }

    /// Verifier with a fixed key set that is never refetched
    pub fn with_keys(project_id: &str, keys: JwkSet) -> Self {
        Self {
            cache: RwLock::new(Some(CachedKeys {
                keys,
                fetched_at: Instant::now(),
            })),
            refresh: false,
            ..Self::new(project_id, None)
        }
    }

    /// Expected token issuer
    pub fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    async fn fetch_keys(&self) -> Result<JwkSet, ProviderError> {
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProviderError::Unavailable(format!("JWKS fetch failed: {e}")))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("JWKS parse failed: {e}")))
    }

    /// Decoding key for `kid`, refetching the key set when stale or when the
    /// key is unknown (Google rotates keys regularly)
    ///
    /// An unknown `kid` only triggers a refetch once the cached set is at least
    /// [`JWKS_MIN_REFETCH_INTERVAL`] old, so made-up key ids cannot drive one
    /// outbound request per login.
    async fn key_for(&self, kid: &str) -> Result<DecodingKey, ProviderError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let age = cached.fetched_at.elapsed();
                if !self.refresh || age < JWKS_CACHE_TTL {
                    if let Some(jwk) = cached.keys.find(kid) {
                        return DecodingKey::from_jwk(jwk)
                            .map_err(|e| ProviderError::Rejected(format!("unusable key: {e}")));
                    }
                    if age < JWKS_MIN_REFETCH_INTERVAL {
                        return Err(ProviderError::Rejected(format!("unknown key id '{kid}'")));
                    }
                }
            }
        }

        if !self.refresh {
            return Err(ProviderError::Rejected(format!("unknown key id '{kid}'")));
        }

        let keys = self.fetch_keys().await?;
        log::debug!("Fetched {} identity provider signing keys", keys.keys.len());

        let key = match keys.find(kid) {
            Some(jwk) => DecodingKey::from_jwk(jwk)
                .map_err(|e| ProviderError::Rejected(format!("unusable key: {e}"))),
            None => Err(ProviderError::Rejected(format!("unknown key id '{kid}'"))),
        };

        *self.cache.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        key
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn verify_id_token(&self, token: &str) -> Result<VerifiedIdentity, ProviderError> {
        let header =
            decode_header(token).map_err(|e| ProviderError::Rejected(format!("malformed: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(ProviderError::Rejected("unexpected algorithm".to_string()));
        }
        let kid = header
            .kid
            .ok_or_else(|| ProviderError::Rejected("missing key id".to_string()))?;

        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        let claims = decode::<FirebaseClaims>(token, &key, &validation)
            .map_err(|e| ProviderError::Rejected(e.to_string()))?
            .claims;

        let email = claims
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProviderError::Rejected("token carries no email".to_string()))?;

        Ok(VerifiedIdentity {
            email,
            subject_id: claims.sub,
        })
    }
}

/// Provider installed when no identity provider is configured.
///
/// Every verification fails as unavailable; self-issued tokens keep working.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableIdentityProvider;

#[async_trait]
impl IdentityProvider for UnavailableIdentityProvider {
    async fn verify_id_token(&self, _token: &str) -> Result<VerifiedIdentity, ProviderError> {
        Err(ProviderError::Unavailable(
            "identity provider not configured".to_string(),
        ))
    }

    fn is_configured(&self) -> bool {
        false
    }
}
