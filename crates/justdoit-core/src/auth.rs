//! Sign-in against the REST API and the saved bearer token.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{StoreError, StoreResult};
use crate::store::local::write_text_atomic;
use crate::store::remote::{build_http_client, endpoint, read_json_response};

pub const TOKEN_FILE: &str = "token";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Debug, Clone)]
pub struct AuthClient {
    base_url: Url,
    http: reqwest::Client,
}

impl AuthClient {
    pub fn new(base_url: Url, timeout: Duration) -> StoreResult<Self> {
        Ok(Self {
            base_url,
            http: build_http_client(timeout)?,
        })
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> StoreResult<String> {
        let url = endpoint(&self.base_url, &["api", "auth", "login"])?;
        let response = self
            .http
            .post(url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let body: AuthResponse = read_json_response(response).await?;
        info!("signed in");
        Ok(body.token)
    }

    /// Creates an account. `confirmation` must repeat `password`; a mismatch
    /// is rejected before anything is sent.
    #[tracing::instrument(skip(self, password, confirmation))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirmation: &str,
    ) -> StoreResult<String> {
        if password != confirmation {
            return Err(StoreError::InvalidInput(
                "Passwords do not match".to_string(),
            ));
        }
        if name.trim().is_empty() || email.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "name and email are required".to_string(),
            ));
        }

        let url = endpoint(&self.base_url, &["api", "auth", "register"])?;
        let response = self
            .http
            .post(url)
            .json(&RegisterRequest {
                name: name.trim(),
                email: email.trim(),
                password,
            })
            .send()
            .await?;
        let body: AuthResponse = read_json_response(response).await?;
        info!("account created");
        Ok(body.token)
    }
}

/// Bearer token persisted in the data directory.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(TOKEN_FILE),
        }
    }

    pub fn load(&self) -> StoreResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, token: &str) -> StoreResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        write_text_atomic(&self.path, token.trim())?;
        debug!(file = %self.path.display(), "token saved");
        Ok(())
    }

    /// Forgets the token. Returns whether one was stored.
    pub fn clear(&self) -> StoreResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Loaded token, or [`StoreError::Unauthorized`] when signed out.
    pub fn require(&self) -> StoreResult<String> {
        self.load()?.ok_or(StoreError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn token_round_trip_and_clear() {
        let temp = tempdir().expect("tempdir");
        let tokens = TokenStore::new(temp.path());

        assert_eq!(tokens.load().expect("load"), None);
        assert!(matches!(tokens.require(), Err(StoreError::Unauthorized)));

        tokens.save("abc.def\n").expect("save");
        assert_eq!(tokens.load().expect("load").as_deref(), Some("abc.def"));

        assert!(tokens.clear().expect("clear"));
        assert!(!tokens.clear().expect("clear twice"));
        assert_eq!(tokens.load().expect("load"), None);
    }

    #[tokio::test]
    async fn register_rejects_mismatched_confirmation_offline() {
        // Port 9 is discard; nothing is contacted because validation fails first.
        let url = Url::parse("http://127.0.0.1:9/").expect("url");
        let client = AuthClient::new(url, Duration::from_millis(50)).expect("client");

        let err = client
            .register("Ann", "ann@example.com", "secret1", "secret2")
            .await
            .expect_err("mismatch");
        match err {
            StoreError::InvalidInput(message) => assert_eq!(message, "Passwords do not match"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
