//! Client seam for the external user directory (the identity provider's
//! management API).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A user as the external directory reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    /// The provider's stable user id.
    pub id: String,
    pub email: Option<String>,
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Transport failure: DNS, connect, timeout.
    #[error("directory request failed: {0}")]
    Request(String),

    /// The directory answered with a non-success status or a bad body.
    #[error("directory api error: {0}")]
    Api(String),
}

/// Read/create access to the external user directory.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError>;

    async fn create_user(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<DirectoryUser, DirectoryError>;
}

/// HTTP client for a directory exposing `GET /users` and `POST /users`.
pub struct HttpUserDirectory {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    request_timeout: Duration,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.timeout(self.request_timeout);
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait::async_trait]
impl UserDirectory for HttpUserDirectory {
    #[instrument(skip(self), err)]
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError> {
        let url = format!("{}/users", self.base_url);
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| DirectoryError::Api(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| DirectoryError::Api(e.to_string()))
    }

    #[instrument(skip(self, display_name), err)]
    async fn create_user(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<DirectoryUser, DirectoryError> {
        let url = format!("{}/users", self.base_url);
        let body = serde_json::json!({
            "email": email,
            "display_name": display_name,
        });

        let response = self
            .authorize(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| DirectoryError::Api(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| DirectoryError::Api(e.to_string()))
    }
}

/// In-memory directory for tests. `fail_on` makes `create_user` fail for a
/// single email to exercise partial-failure handling.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<Vec<DirectoryUser>>,
    fail_on: Mutex<HashMap<String, String>>,
    next_id: Mutex<u64>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<DirectoryUser>) -> Self {
        Self {
            users: Mutex::new(users),
            ..Self::default()
        }
    }

    pub fn add_user(&self, user: DirectoryUser) {
        if let Ok(mut users) = self.users.lock() {
            users.push(user);
        }
    }

    pub fn fail_on(&self, email: &str, message: &str) {
        if let Ok(mut fail_on) = self.fail_on.lock() {
            fail_on.insert(email.to_string(), message.to_string());
        }
    }
}

fn poisoned() -> DirectoryError {
    DirectoryError::Request("poisoned lock".to_string())
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError> {
        Ok(self.users.lock().map_err(|_| poisoned())?.clone())
    }

    async fn create_user(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<DirectoryUser, DirectoryError> {
        if let Some(message) = self.fail_on.lock().map_err(|_| poisoned())?.get(email) {
            return Err(DirectoryError::Api(message.clone()));
        }

        let mut next_id = self.next_id.lock().map_err(|_| poisoned())?;
        *next_id += 1;
        let user = DirectoryUser {
            id: format!("dir|{}", *next_id),
            email: Some(email.to_string()),
            display_name: display_name.map(str::to_string),
        };
        self.users
            .lock()
            .map_err(|_| poisoned())?
            .push(user.clone());
        Ok(user)
    }
}
