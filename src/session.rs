/// Session orchestration: registration, login, refresh rotation, logout.
///
/// The service itself is stateless and safe to share across workers; the
/// token store is the only shared mutable state, and its conditional revoke
/// decides every rotation race. Refresh tokens are single-use: each
/// successful rotation retires the presented record and issues a successor
/// in the same family, so a leaked token is good for at most one unused
/// rotation step.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{check_max_length, AccessTokenCodec, OpaqueTokenGenerator, PasswordHasher};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, RefreshError, StoreError};
use crate::store::{
    CredentialRecord, CredentialStore, NewCredential, NewRefreshToken, RefreshTokenRecord,
    TokenStore,
};
use crate::validators::{validate_display_name, validate_email};

/// How many times a colliding token digest is regenerated before giving up.
const DIGEST_RETRY_LIMIT: usize = 3;

/// Tokens handed out by login and refresh.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
    /// Refresh-token lifetime in seconds (cookie max-age).
    pub refresh_expires_in: i64,
}

pub struct SessionService {
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenStore>,
    hasher: PasswordHasher,
    opaque: OpaqueTokenGenerator,
    codec: AccessTokenCodec,
    jwt: JwtSettings,
}

impl SessionService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        hasher: PasswordHasher,
        codec: AccessTokenCodec,
        jwt: JwtSettings,
    ) -> Self {
        Self {
            credentials,
            tokens,
            hasher,
            opaque: OpaqueTokenGenerator,
            codec,
            jwt,
        }
    }

    /// Register a new principal. An email that is already present yields
    /// `AlreadyRegistered` (409), uniformly for the pre-check and for the
    /// insert race.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<CredentialRecord, AppError> {
        let email = validate_email(email)?;
        let display_name = display_name.map(validate_display_name).transpose()?;

        if self.credentials.find_by_email(&email).await?.is_some() {
            return Err(AppError::AlreadyRegistered);
        }

        // bcrypt is deliberately slow; keep it off the I/O workers
        let hasher = self.hasher;
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))??;

        let record = self
            .credentials
            .insert(NewCredential {
                email,
                password_hash,
                display_name,
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => AppError::AlreadyRegistered,
                other => other.into(),
            })?;

        tracing::info!(user_id = %record.id, "User registered");
        Ok(record)
    }

    /// Authenticate and open a new session (fresh token family). An absent
    /// account and a wrong password are indistinguishable to the caller.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        user_agent: Option<String>,
    ) -> Result<IssuedTokens, AppError> {
        let email = validate_email(email)?;
        check_max_length(password)?;

        let user = match self.credentials.find_by_email(&email).await? {
            Some(user) => user,
            None => return Err(AuthError::InvalidCredentials.into()),
        };

        let hasher = self.hasher;
        let candidate = password.to_string();
        let stored_hash = user.password_hash.clone();
        let password_valid =
            tokio::task::spawn_blocking(move || hasher.verify(&candidate, &stored_hash))
                .await
                .map_err(|e| AppError::Internal(format!("verification task failed: {}", e)))??;

        if !password_valid {
            return Err(AuthError::InvalidCredentials.into());
        }
        if !user.is_active {
            return Err(AuthError::AccountInactive.into());
        }

        let access_token = self
            .codec
            .encode(user.id, &user.email, self.jwt.access_token_expiry)?;
        let (refresh_token, _) = self
            .issue_refresh_token(user.id, Uuid::new_v4(), user_agent)
            .await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_token_expiry,
            refresh_expires_in: self.jwt.refresh_token_expiry,
        })
    }

    /// Rotate a refresh token: retire the presented record, issue a
    /// successor in the same family, and mint a new access token.
    ///
    /// Misuse handling: a record that is already revoked can only be
    /// presented by someone replaying a retired token, so the whole family
    /// is revoked before rejecting. An unknown digest is plain `Invalid`;
    /// there is no family to act on.
    pub async fn refresh(
        &self,
        presented: &str,
        user_agent: Option<String>,
    ) -> Result<IssuedTokens, AppError> {
        let digest = self.opaque.hash(presented);

        let record = match self.tokens.find_by_hash(&digest).await? {
            Some(record) => record,
            None => {
                tracing::warn!("Unknown refresh token presented");
                return Err(RefreshError::Invalid.into());
            }
        };

        if record.revoked {
            let revoked = self.tokens.revoke_family(record.family_id).await?;
            tracing::warn!(
                user_id = %record.user_id,
                family_id = %record.family_id,
                revoked = revoked,
                "Refresh token reuse detected, family revoked"
            );
            return Err(RefreshError::Revoked.into());
        }

        if record.is_expired(Utc::now()) {
            tracing::info!(user_id = %record.user_id, "Expired refresh token presented");
            return Err(RefreshError::Expired.into());
        }

        // Claim the record: of any set of concurrent rotations presenting
        // the same token, exactly one observes this transition.
        if !self.tokens.revoke(record.id).await? {
            tracing::warn!(user_id = %record.user_id, "Lost refresh rotation race");
            return Err(RefreshError::Revoked.into());
        }

        let user = match self.credentials.find_by_id(record.user_id).await? {
            Some(user) => user,
            None => return Err(RefreshError::Invalid.into()),
        };
        if !user.is_active {
            return Err(AuthError::AccountInactive.into());
        }

        let access_token = self
            .codec
            .encode(user.id, &user.email, self.jwt.access_token_expiry)?;
        let (refresh_token, _) = self
            .issue_refresh_token(user.id, record.family_id, user_agent)
            .await?;

        tracing::info!(
            user_id = %user.id,
            family_id = %record.family_id,
            "Refresh token rotated"
        );
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_token_expiry,
            refresh_expires_in: self.jwt.refresh_token_expiry,
        })
    }

    /// Close the session holding `presented`. Fire-and-forget: a missing or
    /// already-dead token means the goal state is already reached, and
    /// store failures are logged but never surfaced.
    pub async fn logout(&self, presented: Option<&str>) {
        if let Some(token) = presented {
            let digest = self.opaque.hash(token);
            if let Err(e) = self.tokens.delete_by_hash(&digest).await {
                tracing::warn!(error = %e, "Logout cleanup failed");
            } else {
                tracing::info!("Session closed");
            }
        }
    }

    /// Profile of an authenticated principal.
    pub async fn profile(&self, user_id: Uuid) -> Result<CredentialRecord, AppError> {
        let user = self
            .credentials
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Auth(AuthError::InvalidCredentials))?;

        if !user.is_active {
            return Err(AuthError::AccountInactive.into());
        }
        Ok(user)
    }

    /// Live sessions (non-revoked, non-expired records) for a principal,
    /// newest first.
    pub async fn sessions(&self, user_id: Uuid) -> Result<Vec<RefreshTokenRecord>, AppError> {
        let now = Utc::now();
        let mut records = self.tokens.find_all_for_user(user_id).await?;
        records.retain(|r| !r.revoked && !r.is_expired(now));
        Ok(records)
    }

    /// Create a refresh-token record, regenerating on the (cosmically
    /// unlikely) digest collision rather than ever reusing a digest.
    async fn issue_refresh_token(
        &self,
        user_id: Uuid,
        family_id: Uuid,
        user_agent: Option<String>,
    ) -> Result<(String, RefreshTokenRecord), AppError> {
        let expires_at = Utc::now() + Duration::seconds(self.jwt.refresh_token_expiry);

        for _ in 0..DIGEST_RETRY_LIMIT {
            let token = self.opaque.generate();
            let new = NewRefreshToken {
                user_id,
                token_hash: self.opaque.hash(&token),
                family_id,
                user_agent: user_agent.clone(),
                expires_at,
            };

            match self.tokens.create(new).await {
                Ok(record) => return Ok((token, record)),
                Err(StoreError::Duplicate) => {
                    tracing::warn!("Refresh token digest collision, regenerating");
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(AppError::Store(StoreError::Duplicate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemCredentials {
        users: Mutex<Vec<CredentialRecord>>,
    }

    impl MemCredentials {
        fn set_active(&self, email: &str, active: bool) {
            let mut users = self.users.lock().unwrap();
            for user in users.iter_mut() {
                if user.email == email {
                    user.is_active = active;
                }
            }
        }
    }

    #[async_trait]
    impl CredentialStore for MemCredentials {
        async fn insert(&self, new: NewCredential) -> Result<CredentialRecord, StoreError> {
            let mut users = self.users.lock().unwrap();
            if users.iter().any(|u| u.email == new.email) {
                return Err(StoreError::Duplicate);
            }
            let record = CredentialRecord {
                id: Uuid::new_v4(),
                email: new.email,
                password_hash: new.password_hash,
                display_name: new.display_name,
                is_active: true,
                created_at: Utc::now(),
            };
            users.push(record.clone());
            Ok(record)
        }

        async fn find_by_email(
            &self,
            email: &str,
        ) -> Result<Option<CredentialRecord>, StoreError> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.email == email).cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.id == id).cloned())
        }
    }

    #[derive(Default)]
    struct MemTokens {
        rows: Mutex<HashMap<String, RefreshTokenRecord>>,
    }

    impl MemTokens {
        fn backdate(&self, token_hash: &str, expires_at: DateTime<Utc>) {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.get_mut(token_hash) {
                row.expires_at = expires_at;
            }
        }

        fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TokenStore for MemTokens {
        async fn create(&self, new: NewRefreshToken) -> Result<RefreshTokenRecord, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(&new.token_hash) {
                return Err(StoreError::Duplicate);
            }
            let record = RefreshTokenRecord {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                token_hash: new.token_hash.clone(),
                family_id: new.family_id,
                user_agent: new.user_agent,
                created_at: Utc::now(),
                expires_at: new.expires_at,
                revoked: false,
            };
            rows.insert(new.token_hash, record.clone());
            Ok(record)
        }

        async fn find_by_hash(
            &self,
            token_hash: &str,
        ) -> Result<Option<RefreshTokenRecord>, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.get(token_hash).cloned())
        }

        async fn revoke(&self, id: Uuid) -> Result<bool, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            for row in rows.values_mut() {
                if row.id == id && !row.revoked {
                    row.revoked = true;
                    return Ok(true);
                }
            }
            Ok(false)
        }

        async fn revoke_family(&self, family_id: Uuid) -> Result<u64, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let mut revoked = 0;
            for row in rows.values_mut() {
                if row.family_id == family_id && !row.revoked {
                    row.revoked = true;
                    revoked += 1;
                }
            }
            Ok(revoked)
        }

        async fn delete_by_hash(&self, token_hash: &str) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().unwrap();
            rows.remove(token_hash);
            Ok(())
        }

        async fn find_all_for_user(
            &self,
            user_id: Uuid,
        ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
            let rows = self.rows.lock().unwrap();
            let mut records: Vec<_> =
                rows.values().filter(|r| r.user_id == user_id).cloned().collect();
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(records)
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|_, r| r.expires_at >= now);
            Ok((before - rows.len()) as u64)
        }
    }

    fn service() -> (SessionService, Arc<MemCredentials>, Arc<MemTokens>) {
        let credentials = Arc::new(MemCredentials::default());
        let tokens = Arc::new(MemTokens::default());
        let jwt = JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            issuer: "propdocs".to_string(),
        };
        let codec = AccessTokenCodec::from_settings(&jwt).unwrap();
        let svc = SessionService::new(
            credentials.clone(),
            tokens.clone(),
            PasswordHasher::new(4),
            codec,
            jwt,
        );
        (svc, credentials, tokens)
    }

    fn digest(token: &str) -> String {
        OpaqueTokenGenerator.hash(token)
    }

    #[tokio::test]
    async fn register_then_login_issues_findable_refresh_token() {
        let (svc, _, tokens) = service();

        let profile = svc.register("a@b.com", "correct123", Some("Ada")).await.unwrap();
        assert_eq!(profile.email, "a@b.com");
        assert!(profile.is_active);

        let issued = svc.login("a@b.com", "correct123", None).await.unwrap();
        assert_eq!(issued.expires_in, 3600);

        let stored = tokens.find_by_hash(&digest(&issued.refresh_token)).await.unwrap();
        assert!(stored.is_some());
        assert!(!stored.unwrap().revoked);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let (svc, _, _) = service();

        svc.register("a@b.com", "correct123", None).await.unwrap();
        match svc.register("a@b.com", "different456", None).await {
            Err(AppError::AlreadyRegistered) => (),
            other => panic!("expected AlreadyRegistered, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (svc, _, _) = service();
        svc.register("a@b.com", "correct123", None).await.unwrap();

        let wrong_password = svc.login("a@b.com", "incorrect123", None).await;
        let unknown_user = svc.login("nobody@b.com", "correct123", None).await;

        for result in [wrong_password, unknown_user] {
            match result {
                Err(AppError::Auth(AuthError::InvalidCredentials)) => (),
                other => panic!("expected InvalidCredentials, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[tokio::test]
    async fn inactive_account_cannot_login() {
        let (svc, credentials, _) = service();
        svc.register("a@b.com", "correct123", None).await.unwrap();
        credentials.set_active("a@b.com", false);

        match svc.login("a@b.com", "correct123", None).await {
            Err(AppError::Auth(AuthError::AccountInactive)) => (),
            other => panic!("expected AccountInactive, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn refresh_rotates_within_the_same_family() {
        let (svc, _, tokens) = service();
        svc.register("a@b.com", "correct123", None).await.unwrap();
        let first = svc.login("a@b.com", "correct123", None).await.unwrap();

        let second = svc.refresh(&first.refresh_token, None).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let old = tokens.find_by_hash(&digest(&first.refresh_token)).await.unwrap().unwrap();
        let new = tokens.find_by_hash(&digest(&second.refresh_token)).await.unwrap().unwrap();
        assert!(old.revoked);
        assert!(!new.revoked);
        assert_eq!(old.family_id, new.family_id);
    }

    #[tokio::test]
    async fn reused_token_revokes_the_whole_family() {
        let (svc, _, tokens) = service();
        svc.register("a@b.com", "correct123", None).await.unwrap();
        let first = svc.login("a@b.com", "correct123", None).await.unwrap();
        let second = svc.refresh(&first.refresh_token, None).await.unwrap();

        // replaying the rotated token is a theft signal
        match svc.refresh(&first.refresh_token, None).await {
            Err(AppError::Refresh(RefreshError::Revoked)) => (),
            other => panic!("expected Revoked, got {:?}", other.map(|_| ())),
        }

        // the successor dies with its family
        let successor = tokens.find_by_hash(&digest(&second.refresh_token)).await.unwrap().unwrap();
        assert!(successor.revoked);
        assert!(svc.refresh(&second.refresh_token, None).await.is_err());
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let (svc, _, _) = service();

        match svc.refresh("definitely-not-issued-by-us", None).await {
            Err(AppError::Refresh(RefreshError::Invalid)) => (),
            other => panic!("expected Invalid, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn expired_token_is_rejected_lazily() {
        let (svc, _, tokens) = service();
        svc.register("a@b.com", "correct123", None).await.unwrap();
        let issued = svc.login("a@b.com", "correct123", None).await.unwrap();

        tokens.backdate(
            &digest(&issued.refresh_token),
            Utc::now() - Duration::seconds(60),
        );

        match svc.refresh(&issued.refresh_token, None).await {
            Err(AppError::Refresh(RefreshError::Expired)) => (),
            other => panic!("expected Expired, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn concurrent_refresh_elects_exactly_one_winner() {
        let (svc, _, _) = service();
        svc.register("a@b.com", "correct123", None).await.unwrap();
        let issued = svc.login("a@b.com", "correct123", None).await.unwrap();

        let (a, b) = tokio::join!(
            svc.refresh(&issued.refresh_token, None),
            svc.refresh(&issued.refresh_token, None)
        );

        assert_eq!(
            a.is_ok() as u8 + b.is_ok() as u8,
            1,
            "exactly one rotation must win"
        );
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_kills_the_session() {
        let (svc, _, tokens) = service();
        svc.register("a@b.com", "correct123", None).await.unwrap();
        let issued = svc.login("a@b.com", "correct123", None).await.unwrap();
        assert_eq!(tokens.len(), 1);

        svc.logout(Some(&issued.refresh_token)).await;
        assert_eq!(tokens.len(), 0);

        // a second logout with the now-dead token is still fine
        svc.logout(Some(&issued.refresh_token)).await;
        svc.logout(None).await;

        match svc.refresh(&issued.refresh_token, None).await {
            Err(AppError::Refresh(RefreshError::Invalid)) => (),
            other => panic!("expected Invalid, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn sessions_lists_only_live_records() {
        let (svc, _, tokens) = service();
        let profile = svc.register("a@b.com", "correct123", None).await.unwrap();

        let phone = svc.login("a@b.com", "correct123", Some("phone".to_string())).await.unwrap();
        let laptop = svc
            .login("a@b.com", "correct123", Some("laptop".to_string()))
            .await
            .unwrap();
        assert_eq!(svc.sessions(profile.id).await.unwrap().len(), 2);

        // rotation keeps one live record per family
        svc.refresh(&phone.refresh_token, Some("phone".to_string())).await.unwrap();
        assert_eq!(svc.sessions(profile.id).await.unwrap().len(), 2);

        tokens.backdate(
            &digest(&laptop.refresh_token),
            Utc::now() - Duration::seconds(60),
        );
        assert_eq!(svc.sessions(profile.id).await.unwrap().len(), 1);
    }
}
