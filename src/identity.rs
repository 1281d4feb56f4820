use async_trait::async_trait;
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Role;

/// IdentityError
///
/// Failures of the hosted identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("user {0} does not exist")]
    NotFound(Uuid),

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("identity service unavailable: {0}")]
    Unavailable(String),

    #[error("identity service misconfigured: {0}")]
    Misconfigured(String),
}

/// IdentityService
///
/// Contract for the external identity/role provider. Authentication resolves roles
/// through it; the notification flow resolves recipient emails through it.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Returns the role tag of `user_id`, failing when the user is unknown or the tag is
    /// outside `0..=2`.
    async fn get_user_role(&self, user_id: Uuid) -> Result<Role, IdentityError>;

    /// Returns the login email of `user_id` from the auth admin API.
    async fn get_user_email(&self, user_id: Uuid) -> Result<String, IdentityError>;
}

pub type IdentityState = Arc<dyn IdentityService>;

#[derive(Deserialize)]
struct RoleRow {
    role: Option<i64>,
}

#[derive(Deserialize)]
struct AdminUser {
    email: Option<String>,
}

/// SupabaseIdentityClient
///
/// Talks to Supabase over HTTP: PostgREST for the `users` table, the Admin API for
/// emails. A single `reqwest::Client` is built once and reused for every call.
#[derive(Clone)]
pub struct SupabaseIdentityClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    // Local-only: address used when the email lookup fails.
    fallback: Option<EmailFallback>,
}

#[derive(Clone, Debug)]
pub struct EmailFallback {
    pub address: Option<String>,
}

impl EmailFallback {
    /// Configured address, or `estudante+<first 8 uuid chars>@teste.local`.
    pub fn address_for(&self, user_id: Uuid) -> String {
        self.address.clone().unwrap_or_else(|| {
            let short: String = user_id.to_string().chars().take(8).collect();
            format!("estudante+{short}@teste.local")
        })
    }
}

impl SupabaseIdentityClient {
    pub fn new(base_url: &str, service_key: &str, fallback: Option<EmailFallback>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            fallback,
        }
    }

    fn ensure_configured(&self) -> Result<(), IdentityError> {
        if self.base_url.is_empty() || self.service_key.is_empty() {
            return Err(IdentityError::Misconfigured(
                "SUPABASE_URL and SUPABASE_SERVICE_KEY must be set".to_string(),
            ));
        }
        Ok(())
    }

    async fn fetch_email(&self, user_id: Uuid) -> Result<String, IdentityError> {
        self.ensure_configured()?;

        let url = format!("{}/auth/v1/admin/users/{}", self.base_url, user_id);
        let response = self
            .http
            .get(url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IdentityError::NotFound(user_id));
        }
        if !response.status().is_success() {
            return Err(IdentityError::Unavailable(format!(
                "admin API returned {}",
                response.status()
            )));
        }

        let user = response
            .json::<AdminUser>()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        user.email
            .filter(|e| !e.is_empty())
            .ok_or(IdentityError::NotFound(user_id))
    }
}

#[async_trait]
impl IdentityService for SupabaseIdentityClient {
    async fn get_user_role(&self, user_id: Uuid) -> Result<Role, IdentityError> {
        self.ensure_configured()?;

        let url = format!("{}/rest/v1/users", self.base_url);
        let response = self
            .http
            .get(url)
            .query(&[("select", "role".to_string()), ("id", format!("eq.{user_id}"))])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IdentityError::Unavailable(format!(
                "role lookup returned {}",
                response.status()
            )));
        }

        let rows = response
            .json::<Vec<RoleRow>>()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(IdentityError::NotFound(user_id))?;
        let raw = row
            .role
            .ok_or_else(|| IdentityError::InvalidRole("null".to_string()))?;

        i16::try_from(raw)
            .ok()
            .and_then(|tag| Role::try_from(tag).ok())
            .ok_or_else(|| IdentityError::InvalidRole(raw.to_string()))
    }

    async fn get_user_email(&self, user_id: Uuid) -> Result<String, IdentityError> {
        match self.fetch_email(user_id).await {
            Ok(email) => Ok(email),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    let address = fallback.address_for(user_id);
                    tracing::warn!(
                        email = %address,
                        user_id = %user_id,
                        error = %e,
                        "Email lookup failed, using local fallback"
                    );
                    Ok(address)
                }
                None => Err(e),
            },
        }
    }
}

/// MockIdentityService
///
/// In-memory identity provider for tests: fixed role and email maps, optionally
/// reporting the upstream as unavailable.
#[derive(Clone, Default)]
pub struct MockIdentityService {
    roles: HashMap<Uuid, i16>,
    emails: HashMap<Uuid, String>,
    pub unavailable: bool,
}

impl MockIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_user(mut self, id: Uuid, role: Role, email: &str) -> Self {
        self.roles.insert(id, role.into());
        if !email.is_empty() {
            self.emails.insert(id, email.to_string());
        }
        self
    }

    /// Registers a user whose stored role tag is not a valid role.
    pub fn with_raw_role(mut self, id: Uuid, tag: i16) -> Self {
        self.roles.insert(id, tag);
        self
    }
}

#[async_trait]
impl IdentityService for MockIdentityService {
    async fn get_user_role(&self, user_id: Uuid) -> Result<Role, IdentityError> {
        if self.unavailable {
            return Err(IdentityError::Unavailable("mock outage".to_string()));
        }
        let tag = self
            .roles
            .get(&user_id)
            .ok_or(IdentityError::NotFound(user_id))?;
        Role::try_from(*tag).map_err(|_| IdentityError::InvalidRole(tag.to_string()))
    }

    async fn get_user_email(&self, user_id: Uuid) -> Result<String, IdentityError> {
        if self.unavailable {
            return Err(IdentityError::Unavailable("mock outage".to_string()));
        }
        self.emails
            .get(&user_id)
            .cloned()
            .ok_or(IdentityError::NotFound(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_address_uses_uuid_prefix() {
        let id = Uuid::parse_str("12345678-9abc-def0-1234-56789abcdef0").unwrap();
        let fallback = EmailFallback { address: None };
        assert_eq!(fallback.address_for(id), "estudante+12345678@teste.local");

        let fixed = EmailFallback {
            address: Some("dev@example.com".into()),
        };
        assert_eq!(fixed.address_for(id), "dev@example.com");
    }

    #[tokio::test]
    async fn mock_rejects_invalid_role_tags() {
        let id = Uuid::new_v4();
        let mock = MockIdentityService::new().with_raw_role(id, 7);
        assert!(matches!(
            mock.get_user_role(id).await,
            Err(IdentityError::InvalidRole(_))
        ));
    }

    #[tokio::test]
    async fn client_without_credentials_is_misconfigured() {
        let client = SupabaseIdentityClient::new("", "", None);
        assert!(matches!(
            client.get_user_role(Uuid::new_v4()).await,
            Err(IdentityError::Misconfigured(_))
        ));
    }
}
