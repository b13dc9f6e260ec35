//! Azure credential resolution
//!
//! Providers are tried in order; the first one whose variables are all
//! present wins. Service principal comes before user/password.

use std::collections::HashMap;
use std::fmt;

use crate::{CloudError, CloudResult};

pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const ENV_USERNAME: &str = "AZURE_USERNAME";
pub const ENV_PASSWORD: &str = "AZURE_PASSWORD";
pub const ENV_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";

/// Snapshot of process environment variables
#[derive(Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn capture() -> Self {
        Self { vars: std::env::vars().collect() }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Non-empty value of a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn require_all<'a>(&'a self, keys: &[&'a str]) -> Result<Vec<&'a str>, Vec<&'a str>> {
        let missing: Vec<&str> = keys.iter().copied().filter(|k| self.get(k).is_none()).collect();
        if missing.is_empty() {
            Ok(keys.iter().filter_map(|k| self.get(k)).collect())
        } else {
            Err(missing)
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment").field("vars", &self.vars.len()).finish()
    }
}

/// Resolved Azure AD credentials
#[derive(Clone, PartialEq, Eq)]
pub enum AzureCredentials {
    ServicePrincipal {
        client_id: String,
        client_secret: String,
        tenant_id: String,
    },
    UserPassword {
        username: String,
        password: String,
        tenant_id: Option<String>,
    },
}

impl AzureCredentials {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServicePrincipal { .. } => "service principal",
            Self::UserPassword { .. } => "user/password",
        }
    }
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServicePrincipal { client_id, tenant_id, .. } => f
                .debug_struct("ServicePrincipal")
                .field("client_id", client_id)
                .field("tenant_id", tenant_id)
                .finish_non_exhaustive(),
            Self::UserPassword { username, tenant_id, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("tenant_id", tenant_id)
                .finish_non_exhaustive(),
        }
    }
}

/// One way of finding credentials
pub trait CredentialProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, env: &Environment) -> CloudResult<AzureCredentials>;
}

/// `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`, `AZURE_TENANT_ID`
pub struct ServicePrincipalProvider;

impl CredentialProvider for ServicePrincipalProvider {
    fn name(&self) -> &'static str {
        "service principal"
    }

    fn resolve(&self, env: &Environment) -> CloudResult<AzureCredentials> {
        match env.require_all(&[ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_TENANT_ID]) {
            Ok(values) => Ok(AzureCredentials::ServicePrincipal {
                client_id: values[0].to_string(),
                client_secret: values[1].to_string(),
                tenant_id: values[2].to_string(),
            }),
            Err(missing) => Err(CloudError::Configuration(format!("missing {}", missing.join(", ")))),
        }
    }
}

/// `AZURE_USERNAME`, `AZURE_PASSWORD`, optional `AZURE_TENANT_ID`
pub struct UserPasswordProvider;

impl CredentialProvider for UserPasswordProvider {
    fn name(&self) -> &'static str {
        "user/password"
    }

    fn resolve(&self, env: &Environment) -> CloudResult<AzureCredentials> {
        match env.require_all(&[ENV_USERNAME, ENV_PASSWORD]) {
            Ok(values) => Ok(AzureCredentials::UserPassword {
                username: values[0].to_string(),
                password: values[1].to_string(),
                tenant_id: env.get(ENV_TENANT_ID).map(str::to_string),
            }),
            Err(missing) => Err(CloudError::Configuration(format!("missing {}", missing.join(", ")))),
        }
    }
}

/// Ordered provider list
pub struct CredentialChain {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl CredentialChain {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// First provider that resolves wins; if none do, one configuration error
    /// naming what each provider was missing.
    pub fn resolve(&self, env: &Environment) -> CloudResult<AzureCredentials> {
        let mut reasons = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            match provider.resolve(env) {
                Ok(credentials) => {
                    tracing::debug!("Using {} credentials", provider.name());
                    return Ok(credentials);
                }
                Err(e) => reasons.push(format!("{}: {}", provider.name(), e)),
            }
        }
        Err(CloudError::Configuration(format!(
            "unable to find Azure credentials in the environment ({})",
            reasons.join("; ")
        )))
    }
}

impl Default for CredentialChain {
    fn default() -> Self {
        Self::new(vec![Box::new(ServicePrincipalProvider), Box::new(UserPasswordProvider)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_principal_first() {
        let env = Environment::from_pairs([
            (ENV_CLIENT_ID, "app"),
            (ENV_CLIENT_SECRET, "s3cret"),
            (ENV_TENANT_ID, "contoso"),
            (ENV_USERNAME, "alice@contoso.com"),
            (ENV_PASSWORD, "pw"),
        ]);

        let creds = tokio_test::assert_ok!(CredentialChain::default().resolve(&env));
        assert_eq!(creds.kind(), "service principal");
    }

    #[test]
    fn test_falls_back_to_user_password() {
        let env = Environment::from_pairs([
            (ENV_CLIENT_ID, "app"),
            (ENV_USERNAME, "alice@contoso.com"),
            (ENV_PASSWORD, "pw"),
        ]);

        match CredentialChain::default().resolve(&env).unwrap() {
            AzureCredentials::UserPassword { username, tenant_id, .. } => {
                assert_eq!(username, "alice@contoso.com");
                assert_eq!(tenant_id, None);
            }
            other => panic!("unexpected credentials: {other:?}"),
        }
    }

    #[test]
    fn test_no_credentials_is_single_configuration_error() {
        let env = Environment::from_pairs([(ENV_PASSWORD, "")]);

        match CredentialChain::default().resolve(&env).unwrap_err() {
            CloudError::Configuration(msg) => {
                assert!(msg.contains("AZURE_CLIENT_ID"));
                assert!(msg.contains("AZURE_USERNAME"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = AzureCredentials::ServicePrincipal {
            client_id: "app".into(),
            client_secret: "s3cret".into(),
            tenant_id: "contoso".into(),
        };
        assert!(!format!("{:?}", creds).contains("s3cret"));
    }
}
