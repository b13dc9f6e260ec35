//! OAuth2 tokens for the Azure Resource Manager.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use url::Url;

use crate::credentials::AzureCredentials;
use crate::{CloudError, CloudResult};

/// Public client id of the Azure CLI, used for the password grant
const AZURE_CLI_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Returns true if the token is expired or will expire within the grace period.
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Caches one access token and refreshes it ahead of expiry
#[derive(Debug)]
pub struct TokenCache {
    credentials: AzureCredentials,
    authority: Url,
    scope: String,
    http_client: reqwest::Client,
    cached_token: RwLock<Option<CachedToken>>,
    grace_period: Duration,
}

impl TokenCache {
    pub fn new(credentials: AzureCredentials, authority: Url, resource: &Url) -> Self {
        Self {
            credentials,
            authority,
            scope: format!("{}/.default", resource.as_str().trim_end_matches('/')),
            http_client: reqwest::Client::new(),
            cached_token: RwLock::new(None),
            grace_period: Duration::minutes(5),
        }
    }

    /// Gets a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> CloudResult<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache {
                if !token.is_expired(self.grace_period) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("Refreshing access token");
        let new_token = self.acquire_token().await?;
        let access_token = new_token.access_token.clone();
        *self.cached_token.write().await = Some(new_token);
        Ok(access_token)
    }

    /// Forces a refresh on next use.
    pub async fn invalidate(&self) {
        *self.cached_token.write().await = None;
    }

    #[instrument(skip(self), fields(kind = self.credentials.kind()))]
    async fn acquire_token(&self) -> CloudResult<CachedToken> {
        let (tenant, params): (&str, Vec<(&str, &str)>) = match &self.credentials {
            AzureCredentials::ServicePrincipal { client_id, client_secret, tenant_id } => (
                tenant_id.as_str(),
                vec![
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", self.scope.as_str()),
                ],
            ),
            AzureCredentials::UserPassword { username, password, tenant_id } => (
                tenant_id.as_deref().unwrap_or("organizations"),
                vec![
                    ("grant_type", "password"),
                    ("client_id", AZURE_CLI_CLIENT_ID),
                    ("username", username.as_str()),
                    ("password", password.as_str()),
                    ("scope", self.scope.as_str()),
                ],
            ),
        };

        let token_url = self.authority.join(&format!("{}/oauth2/v2.0/token", tenant))?;
        let response = self
            .http_client
            .post(token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CloudError::Auth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!(
                "Token request failed with status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| CloudError::Auth(format!("Failed to parse token response: {}", e)))?;

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at: Utc::now() + Duration::seconds(token_response.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_cached_token_expiry() {
        let token = CachedToken {
            access_token: "test".to_string(),
            expires_at: Utc::now() + Duration::minutes(10),
        };

        assert!(!token.is_expired(Duration::minutes(5)));
        assert!(token.is_expired(Duration::minutes(15)));
    }

    #[tokio::test]
    async fn test_service_principal_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cache = TokenCache::new(
            AzureCredentials::ServicePrincipal {
                client_id: "app".into(),
                client_secret: "s3cret".into(),
                tenant_id: "contoso".into(),
            },
            Url::parse(&format!("{}/", server.uri())).unwrap(),
            &Url::parse("https://management.azure.com/").unwrap(),
        );

        assert_eq!(cache.get_token().await.unwrap(), "tok-1");
        assert_eq!(cache.get_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn test_password_grant_uses_organizations_tenant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/organizations/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-2",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let cache = TokenCache::new(
            AzureCredentials::UserPassword {
                username: "alice@contoso.com".into(),
                password: "pw".into(),
                tenant_id: None,
            },
            Url::parse(&format!("{}/", server.uri())).unwrap(),
            &Url::parse("https://management.azure.com/").unwrap(),
        );

        assert_eq!(cache.get_token().await.unwrap(), "tok-2");
    }

    #[tokio::test]
    async fn test_rejected_token_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("AADSTS7000215: Invalid client secret"))
            .mount(&server)
            .await;

        let cache = TokenCache::new(
            AzureCredentials::ServicePrincipal {
                client_id: "app".into(),
                client_secret: "wrong".into(),
                tenant_id: "contoso".into(),
            },
            Url::parse(&format!("{}/", server.uri())).unwrap(),
            &Url::parse("https://management.azure.com/").unwrap(),
        );

        assert!(matches!(cache.get_token().await, Err(CloudError::Auth(_))));
    }
}
