//! Integration tests for the login, 2FA and credential verification flows.
//!
//! Provider credentials are real RS256 JWTs signed with the fixture key and
//! checked by `FirebaseIdentityProvider` against the fixture JWKS.

use async_trait::async_trait;
use blackjack_rewards::auth::totp::generate_code;
use blackjack_rewards::auth::{
    AuthError, AuthManager, FirebaseIdentityProvider, IdentityProvider, LoginOutcome,
    ProviderError, RetryPolicy, SessionTokenIssuer, TwoFactorSetup, VerifiedIdentity,
};
use blackjack_rewards::db::{MemoryStore, Repositories, UserRepository};
use blackjack_rewards::mail::MemoryMailer;
use blackjack_rewards::rewards::{CodeKind, RewardsConfig, RewardsManager};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const PRIVATE_KEY: &str = include_str!("fixtures/provider_key.pem");
const JWKS: &str = include_str!("fixtures/provider_jwks.json");
const PROJECT: &str = "blackjack-test";
const JWT_SECRET: &str = "integration_secret_that_is_at_least_32_chars";

fn firebase_token(email: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = json!({
        "iss": format!("https://securetoken.google.com/{PROJECT}"),
        "aud": PROJECT,
        "sub": format!("uid-{}", email.len()),
        "email": email,
        "iat": now,
        "exp": now + 600,
    });
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("test-key-1".to_string());
    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap(),
    )
    .unwrap()
}

struct Harness {
    store: MemoryStore,
    mailer: MemoryMailer,
    auth: AuthManager,
    rewards: RewardsManager,
}

fn harness_with(provider: Arc<dyn IdentityProvider>, policy: RetryPolicy) -> Harness {
    let store = MemoryStore::new();
    let mailer = MemoryMailer::new();
    let repos = Repositories::memory(store.clone());
    let rewards = RewardsManager::new(&repos, Arc::new(mailer.clone()), RewardsConfig::default());
    let auth = AuthManager::new(
        &repos,
        provider,
        SessionTokenIssuer::with_defaults(JWT_SECRET),
        policy,
        rewards.clone(),
    );
    Harness {
        store,
        mailer,
        auth,
        rewards,
    }
}

fn harness() -> Harness {
    let keys: JwkSet = serde_json::from_str(JWKS).unwrap();
    harness_with(
        Arc::new(FirebaseIdentityProvider::with_keys(PROJECT, keys)),
        RetryPolicy::default(),
    )
}

// ===== New user bootstrap =====

#[tokio::test]
async fn test_new_user_bootstrap() {
    let h = harness();
    let outcome = h.auth.login(&firebase_token("new@example.com")).await.unwrap();

    let LoginOutcome::NewUser {
        token,
        welcome_code,
        welcome_email_sent,
    } = outcome
    else {
        panic!("expected new user, got {outcome:?}");
    };
    assert!(welcome_email_sent);

    let user = h.store.find_by_email("new@example.com").await.unwrap().unwrap();
    assert_eq!(user.balance, 0);
    assert!(!user.two_factor_enabled);

    let codes = h.rewards.codes("new@example.com").await.unwrap();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].kind, CodeKind::Welcome);
    assert_eq!(codes[0].amount, 1000);
    assert_eq!(codes[0].code, welcome_code);

    let mails = h.mailer.sent_to("new@example.com");
    assert_eq!(mails.len(), 1);
    assert!(mails[0].body.contains(&welcome_code));

    let claims = h.auth.require_full_session(&token).unwrap();
    assert_eq!(claims.email, "new@example.com");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_logins_issue_one_welcome() {
    let h = harness();
    let token = firebase_token("race@example.com");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let auth = h.auth.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move { auth.login(&token).await }));
    }

    let mut new_users = 0;
    for handle in handles {
        if let LoginOutcome::NewUser { .. } = handle.await.unwrap().unwrap() {
            new_users += 1;
        }
    }

    assert_eq!(new_users, 1);
    assert_eq!(h.rewards.codes("race@example.com").await.unwrap().len(), 1);
}

// ===== Two-factor gate =====

#[tokio::test]
async fn test_two_factor_gate() {
    let h = harness();
    let provider_token = firebase_token("gated@example.com");
    h.auth.login(&provider_token).await.unwrap();

    // Setup accepts the provider credential directly
    let TwoFactorSetup::Enrolled { secret, qr_code, .. } =
        h.auth.setup_two_factor(&provider_token).await.unwrap()
    else {
        panic!("expected enrollment");
    };
    assert!(qr_code.starts_with("data:image/png;base64,"));

    // Enrolling again keeps the secret
    assert_eq!(
        h.auth.setup_two_factor(&provider_token).await.unwrap(),
        TwoFactorSetup::AlreadyEnabled
    );

    let LoginOutcome::TwoFactorRequired { temp_token } =
        h.auth.login(&provider_token).await.unwrap()
    else {
        panic!("expected 2FA challenge");
    };

    // The pre-2FA token opens nothing that needs a full session
    assert!(matches!(
        h.auth.require_full_session(&temp_token),
        Err(AuthError::TwoFactorRequired)
    ));

    let now = chrono::Utc::now().timestamp() as u64;
    let code = generate_code(&secret, now).unwrap();
    let full = h
        .auth
        .verify_two_factor_at("gated@example.com", &code, &temp_token, now)
        .await
        .unwrap();
    assert!(h.auth.require_full_session(&full).unwrap().two_fa_verified);
}

#[tokio::test]
async fn test_totp_window_tolerance() {
    let h = harness();
    let provider_token = firebase_token("window@example.com");
    h.auth.login(&provider_token).await.unwrap();
    let TwoFactorSetup::Enrolled { secret, .. } =
        h.auth.setup_two_factor(&provider_token).await.unwrap()
    else {
        panic!("expected enrollment");
    };
    let temp = h
        .auth
        .tokens()
        .issue("window@example.com", "uid", false)
        .unwrap();

    let t = 1_760_000_000u64;
    for offset in [-30i64, 0, 30] {
        let code = generate_code(&secret, (t as i64 + offset) as u64).unwrap();
        assert!(
            h.auth
                .verify_two_factor_at("window@example.com", &code, &temp, t)
                .await
                .is_ok(),
            "offset {offset} should be accepted"
        );
    }

    let far = generate_code(&secret, t - 60).unwrap();
    let near: Vec<String> = [t - 30, t, t + 30]
        .iter()
        .map(|&x| generate_code(&secret, x).unwrap())
        .collect();
    if !near.contains(&far) {
        assert!(matches!(
            h.auth
                .verify_two_factor_at("window@example.com", &far, &temp, t)
                .await,
            Err(AuthError::InvalidTwoFactorCode)
        ));
    }
}

#[tokio::test]
async fn test_verify_two_factor_rejects_foreign_temp_token() {
    let h = harness();
    let other = SessionTokenIssuer::with_defaults("some_other_secret_that_is_32_chars_long!");
    let forged = other.issue("a@example.com", "uid", false).unwrap();

    assert!(matches!(
        h.auth.verify_two_factor("a@example.com", "123456", &forged).await,
        Err(AuthError::InvalidCredential)
    ));
}

// ===== Provider failures =====

struct HangingProvider {
    calls: AtomicU32,
}

#[async_trait]
impl IdentityProvider for HangingProvider {
    async fn verify_id_token(&self, _token: &str) -> Result<VerifiedIdentity, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ProviderError::Unavailable("never answers".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_login_times_out_after_three_attempts() {
    let provider = Arc::new(HangingProvider {
        calls: AtomicU32::new(0),
    });
    let h = harness_with(provider.clone(), RetryPolicy::default());

    assert!(matches!(
        h.auth.login("whatever").await,
        Err(AuthError::VerificationTimeout)
    ));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    assert!(h.store.list_emails().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_self_issued_token_survives_provider_outage() {
    let provider = Arc::new(HangingProvider {
        calls: AtomicU32::new(0),
    });
    let h = harness_with(provider, RetryPolicy::default());
    let token = h.auth.tokens().issue("a@example.com", "uid", true).unwrap();

    let identity = h.auth.authenticate(&token).await.unwrap();
    assert_eq!(identity.email, "a@example.com");
}

#[tokio::test]
async fn test_rejected_credential() {
    let h = harness();
    assert!(matches!(
        h.auth.login("eyJhbGciOiJSUzI1NiJ9.e30.c2ln").await,
        Err(AuthError::InvalidCredential)
    ));
}
