use crate::client::ApiClient;
use crate::error::{ClientError, Result};
use crate::record::{Session, User};
use log::{info, warn};

/// Rejections from the auth endpoints become `AuthenticationFailed` with the
/// server's message kept verbatim.
fn auth_error(err: ClientError) -> ClientError {
    match err {
        ClientError::RequestFailed { message, .. } => ClientError::AuthenticationFailed(message),
        other => other,
    }
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ClientError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Owns the authentication lifecycle of one client instance.
pub struct SessionManager {
    client: ApiClient,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            session: None,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn current_user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.current_user().is_some_and(|user| user.is_admin)
    }

    /// Rebuilds the session from persisted credentials without contacting the
    /// backend. A token without a user record (or the reverse) is discarded.
    pub fn restore_session(&mut self) -> Result<Option<&Session>> {
        let store = self.client.store();
        let token = store.token()?;
        let user = store.user()?;
        self.session = match (token, user) {
            (Some(token), Some(user)) => {
                info!("Restored session for {}", user.username);
                Some(Session { token, user })
            }
            (None, None) => None,
            _ => {
                warn!("Discarding half-persisted session");
                store.clear()?;
                None
            }
        };
        Ok(self.session.as_ref())
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<&Session> {
        require(username, "Username")?;
        require(password, "Password")?;

        let response = self
            .client
            .login(username, password)
            .await
            .map_err(auth_error)?;
        let token = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ClientError::AuthenticationFailed(
                    "Login response did not include an access token".to_string(),
                )
            })?;
        let user = response.user.ok_or_else(|| {
            ClientError::MalformedResponse("login response did not include a user".to_string())
        })?;

        let session = Session { token, user };
        self.client.store().save_session(&session)?;
        info!("Logged in as {}", session.user.username);
        Ok(&*self.session.insert(session))
    }

    /// Creates an account. The caller still has to [`login`](Self::login).
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        admin_secret: Option<&str>,
    ) -> Result<()> {
        require(username, "Username")?;
        require(email, "Email")?;
        require(password, "Password")?;
        let admin_secret = admin_secret.filter(|secret| !secret.is_empty());

        self.client
            .register(username, email, password, admin_secret)
            .await
            .map_err(auth_error)?;
        info!("Registered account {}", username);
        Ok(())
    }

    /// Re-reads the profile so role changes reach the cached user record.
    pub async fn refresh_profile(&mut self) -> Result<&User> {
        if self.session.is_none() {
            return Err(ClientError::Validation("Not logged in".to_string()));
        }
        let user = self.client.get_profile().await?;
        self.update_user(user)
    }

    /// Replaces the cached profile of the active session.
    pub fn update_user(&mut self, user: User) -> Result<&User> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ClientError::Validation("Not logged in".to_string()))?;
        self.client.store().set_user(&user)?;
        session.user = user;
        Ok(&session.user)
    }

    /// Clears persisted credentials. Safe to call without a session.
    pub fn logout(&mut self) -> Result<()> {
        self.client.store().clear()?;
        if let Some(session) = self.session.take() {
            info!("Logged out {}", session.user.username);
        }
        Ok(())
    }

    /// Forces a logout when `err` shows the stored token was rejected.
    pub fn expire_if_unauthorized(&mut self, err: &ClientError) -> Result<bool> {
        if !err.is_unauthorized() {
            return Ok(false);
        }
        warn!("Session rejected by the server; logging out");
        self.logout()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::fake::FakeTransport;
    use crate::store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, TOKEN_KEY};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn manager(fake: &Arc<FakeTransport>, store: Arc<dyn CredentialStore>) -> SessionManager {
        SessionManager::new(ApiClient::with_transport(
            ClientConfig::new("http://api.test"),
            fake.clone(),
            store,
        ))
    }

    fn alice_login() -> serde_json::Value {
        json!({
            "access_token": "tok123",
            "token_type": "bearer",
            "user": {"id": 1, "username": "alice", "is_admin": false}
        })
    }

    #[tokio::test]
    async fn test_login_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let fake = Arc::new(FakeTransport::new());
        fake.push_json(200, alice_login());

        let mut first = manager(&fake, Arc::new(FileCredentialStore::new(&path)));
        first.login("alice", "secret").await.unwrap();
        assert!(first.is_authenticated());

        let mut restarted = manager(&fake, Arc::new(FileCredentialStore::new(&path)));
        let session = restarted.restore_session().unwrap().cloned().unwrap();
        assert_eq!(session.token, "tok123");
        assert_eq!(session.user.username, "alice");
        // restore does not touch the network
        assert_eq!(fake.request_count(), 1);
    }

    #[tokio::test]
    async fn test_logout_then_restore_has_no_session() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_json(200, alice_login());
        let store = Arc::new(MemoryCredentialStore::new());

        let mut sessions = manager(&fake, store.clone());
        sessions.login("alice", "secret").await.unwrap();
        sessions.logout().unwrap();
        sessions.logout().unwrap();

        let mut restarted = manager(&fake, store);
        assert!(restarted.restore_session().unwrap().is_none());
        assert!(!restarted.is_authenticated());
    }

    #[tokio::test]
    async fn test_rejected_login_surfaces_server_detail() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_json(401, json!({"detail": "Invalid credentials"}));
        let store = Arc::new(MemoryCredentialStore::new());
        let mut sessions = manager(&fake, store.clone());

        match sessions.login("alice", "wrong").await {
            Err(ClientError::AuthenticationFailed(message)) => {
                assert_eq!(message, "Invalid credentials")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(store.token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_without_token_is_rejected() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_json(200, json!({"message": "ok"}));
        let mut sessions = manager(&fake, Arc::new(MemoryCredentialStore::new()));

        let err = sessions.login("alice", "secret").await.unwrap_err();
        assert!(matches!(err, ClientError::AuthenticationFailed(_)));
        assert!(!sessions.is_authenticated());
    }

    #[tokio::test]
    async fn test_blank_credentials_skip_network() {
        let fake = Arc::new(FakeTransport::new());
        let mut sessions = manager(&fake, Arc::new(MemoryCredentialStore::new()));

        let err = sessions.login("", "secret").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(fake.request_count(), 0);
    }

    #[tokio::test]
    async fn test_register_does_not_start_session() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_json(201, alice_login());
        let store = Arc::new(MemoryCredentialStore::new());
        let sessions = manager(&fake, store.clone());

        sessions
            .register("alice", "alice@example.org", "secret", None)
            .await
            .unwrap();
        assert!(!sessions.is_authenticated());
        assert_eq!(store.token().unwrap(), None);
        assert!(!fake.requests()[0].headers.contains_key("x-admin-secret"));
    }

    #[tokio::test]
    async fn test_register_conflict_is_authentication_failure() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_json(400, json!({"detail": "Username already registered"}));
        let sessions = manager(&fake, Arc::new(MemoryCredentialStore::new()));

        let err = sessions
            .register("alice", "alice@example.org", "secret", Some(""))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Username already registered");
    }

    #[test]
    fn test_half_persisted_session_is_cleared() {
        let fake = Arc::new(FakeTransport::new());
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(TOKEN_KEY, "orphan").unwrap();

        let mut sessions = manager(&fake, store.clone());
        assert!(sessions.restore_session().unwrap().is_none());
        assert_eq!(store.token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_unauthorized_error_forces_logout() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_json(200, alice_login());
        fake.push_json(401, json!({"detail": "Token expired"}));
        let store = Arc::new(MemoryCredentialStore::new());
        let mut sessions = manager(&fake, store.clone());
        sessions.login("alice", "secret").await.unwrap();

        let err = sessions.client().get_species().await.unwrap_err();
        assert!(sessions.expire_if_unauthorized(&err).unwrap());
        assert!(!sessions.is_authenticated());
        assert_eq!(store.token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_profile_updates_admin_flag() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_json(200, alice_login());
        fake.push_json(
            200,
            json!({"user": {"id": 1, "username": "alice", "is_admin": true}}),
        );
        let store = Arc::new(MemoryCredentialStore::new());
        let mut sessions = manager(&fake, store.clone());
        sessions.login("alice", "secret").await.unwrap();
        assert!(!sessions.is_admin());

        sessions.refresh_profile().await.unwrap();
        assert!(sessions.is_admin());
        assert!(store.user().unwrap().unwrap().is_admin);
    }
}
