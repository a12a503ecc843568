use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::Result;

/// How requests to the catalog are authenticated.
#[derive(Clone, Default)]
pub enum Authentication {
    #[default]
    Anonymous,
    /// A pre-issued bearer token.
    Token(String),
    /// OAuth2 client-credentials grant against `token_endpoint`. When no endpoint is given the
    /// catalog's own `v1/oauth/tokens` endpoint is used.
    ClientCredentials {
        token_endpoint: Option<Url>,
        client_id: String,
        client_secret: String,
        scope: Option<String>,
    },
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authentication::Anonymous => write!(f, "Anonymous"),
            Authentication::Token(_) => write!(f, "Token(********)"),
            Authentication::ClientCredentials {
                token_endpoint,
                client_id,
                scope,
                ..
            } => f
                .debug_struct("ClientCredentials")
                .field("token_endpoint", token_endpoint)
                .field("client_id", client_id)
                .field("client_secret", &"********")
                .field("scope", scope)
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Catalog base URL, always with a trailing slash so relative joins stay below it.
    pub catalog_url: Url,
    pub warehouse: String,
    pub authentication: Authentication,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(catalog_url: impl AsRef<str>, warehouse: impl Into<String>) -> Result<Self> {
        let mut catalog_url = Url::parse(catalog_url.as_ref())?;
        if !catalog_url.path().ends_with('/') {
            catalog_url.set_path(&format!("{}/", catalog_url.path()));
        }

        Ok(Self {
            catalog_url,
            warehouse: warehouse.into(),
            authentication: Authentication::Anonymous,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn builder(
        catalog_url: impl Into<String>,
        warehouse: impl Into<String>,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder::new(catalog_url, warehouse)
    }

    /// The endpoint used for the client-credentials exchange.
    pub fn token_endpoint(&self) -> Result<Option<Url>> {
        match &self.authentication {
            Authentication::ClientCredentials {
                token_endpoint: Some(endpoint),
                ..
            } => Ok(Some(endpoint.clone())),
            Authentication::ClientCredentials {
                token_endpoint: None,
                ..
            } => Ok(Some(self.catalog_url.join("v1/oauth/tokens")?)),
            _ => Ok(None),
        }
    }
}

pub struct ClientConfigBuilder {
    catalog_url: String,
    warehouse: String,
    authentication: Authentication,
    timeout: Duration,
    connect_timeout: Duration,
}

impl ClientConfigBuilder {
    pub fn new(catalog_url: impl Into<String>, warehouse: impl Into<String>) -> Self {
        Self {
            catalog_url: catalog_url.into(),
            warehouse: warehouse.into(),
            authentication: Authentication::Anonymous,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(self.catalog_url, self.warehouse)?;
        config.authentication = self.authentication;
        config.timeout = self.timeout;
        config.connect_timeout = self.connect_timeout;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("http://localhost:8181/catalog", "http://localhost:8181/catalog/")]
    #[case("http://localhost:8181/catalog/", "http://localhost:8181/catalog/")]
    #[case("http://localhost:8181", "http://localhost:8181/")]
    fn test_catalog_url_gets_trailing_slash(#[case] input: &str, #[case] expected: &str) {
        let config = ClientConfig::new(input, "demo").unwrap();
        assert_eq!(config.catalog_url.as_str(), expected);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(ClientConfig::new("not a url", "demo").is_err());
    }

    #[test]
    fn test_default_token_endpoint_is_below_catalog() {
        let config = ClientConfig::builder("http://localhost:8181/catalog", "demo")
            .authentication(Authentication::ClientCredentials {
                token_endpoint: None,
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                scope: None,
            })
            .build()
            .unwrap();
        assert_eq!(
            config.token_endpoint().unwrap().unwrap().as_str(),
            "http://localhost:8181/catalog/v1/oauth/tokens"
        );
    }

    #[test]
    fn test_anonymous_has_no_token_endpoint() {
        let config = ClientConfig::new("http://localhost:8181/catalog", "demo").unwrap();
        assert!(config.token_endpoint().unwrap().is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let auth = Authentication::ClientCredentials {
            token_endpoint: None,
            client_id: "spark".to_string(),
            client_secret: "hunter2".to_string(),
            scope: Some("lakekeeper".to_string()),
        };
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("spark"));
        assert!(!rendered.contains("hunter2"));
        assert!(!format!("{:?}", Authentication::Token("abc".into())).contains("abc"));
    }
}
