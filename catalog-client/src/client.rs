use reqwest::{header, Client, Method, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::config::{Authentication, ClientConfig};
use crate::error::{Error, Result};
use crate::models::{CatalogConfig, ErrorResponse, TokenRequest, TokenResponse};

/// Separator Iceberg REST uses to encode multi-level namespaces in a single path segment.
const NAMESPACE_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone)]
pub struct RestCatalogClient {
    client: Client,
    config: ClientConfig,
    prefix: Option<String>,
}

impl RestCatalogClient {
    /// Authenticate (if configured) and resolve the warehouse prefix from `v1/config`.
    #[instrument(skip(config), fields(catalog_url = %config.catalog_url, warehouse = %config.warehouse))]
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let token = match &config.authentication {
            Authentication::Anonymous => None,
            Authentication::Token(token) => Some(token.clone()),
            Authentication::ClientCredentials { .. } => Some(fetch_token(&config).await?),
        };

        let mut client = Self::new(config, token.as_deref())?;
        let catalog_config = client.get_config().await?;
        client.prefix = catalog_config.prefix().map(str::to_string);
        debug!(prefix = ?client.prefix, "resolved catalog prefix");
        Ok(client)
    }

    /// Build a client without contacting the catalog. The prefix stays unset until
    /// [`RestCatalogClient::with_prefix`] or [`RestCatalogClient::connect`] provides one.
    pub fn new(config: ClientConfig, token: Option<&str>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {token}"))?,
            );
        }
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            prefix: None,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    #[instrument(skip(self))]
    pub async fn get_config(&self) -> Result<CatalogConfig> {
        let mut url = self.config.catalog_url.join("v1/config")?;
        url.query_pairs_mut()
            .append_pair("warehouse", &self.config.warehouse);

        let response = self.client.get(url).send().await?;
        self.handle_response(response).await
    }

    #[instrument(skip(self))]
    pub async fn table_exists(&self, namespace: &str, table: &str) -> Result<bool> {
        let url = self.table_url(namespace, table)?;
        let response = self.client.request(Method::HEAD, url).send().await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(self.error_from(response).await),
        }
    }

    /// Drop a table. With `purge_requested` the catalog deletes the table data as well instead
    /// of keeping the table recoverable until its soft-delete retention expires.
    #[instrument(skip(self))]
    pub async fn drop_table(
        &self,
        namespace: &str,
        table: &str,
        purge_requested: bool,
    ) -> Result<()> {
        let url = self.drop_url(namespace, table, purge_requested)?;
        let response = self.client.delete(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::TableNotFound(format!("{namespace}.{table}"))),
            _ => Err(self.error_from(response).await),
        }
    }

    /// `v1/{prefix}/namespaces/{namespace}/tables/{table}` below the catalog URL.
    pub fn table_url(&self, namespace: &str, table: &str) -> Result<Url> {
        let mut url = self.config.catalog_url.clone();
        let encoded_namespace = namespace.split('.').collect::<Vec<_>>().join(NAMESPACE_SEPARATOR);
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::CannotBeABase(self.config.catalog_url.to_string()))?;
            segments.pop_if_empty().push("v1");
            if let Some(prefix) = &self.prefix {
                segments.extend(prefix.split('/').filter(|s| !s.is_empty()));
            }
            segments.extend(["namespaces", encoded_namespace.as_str(), "tables", table]);
        }
        Ok(url)
    }

    /// [`RestCatalogClient::table_url`] with the `purgeRequested` flag a drop carries.
    pub fn drop_url(&self, namespace: &str, table: &str, purge_requested: bool) -> Result<Url> {
        let mut url = self.table_url(namespace, table)?;
        url.query_pairs_mut()
            .append_pair("purgeRequested", &purge_requested.to_string());
        Ok(url)
    }

    async fn handle_response<T>(&self, response: Response) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if response.status().is_success() {
            response.json::<T>().await.map_err(Error::from)
        } else {
            Err(self.error_from(response).await)
        }
    }

    async fn error_from(&self, response: Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = ErrorResponse::message_from_body(&body);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Error::AuthenticationFailed(message)
            }
            _ => Error::ApiError {
                status: status.as_u16(),
                message,
            },
        }
    }
}

/// Exchange client credentials for a bearer token.
#[instrument(skip(config))]
async fn fetch_token(config: &ClientConfig) -> Result<String> {
    let Authentication::ClientCredentials {
        client_id,
        client_secret,
        scope,
        ..
    } = &config.authentication
    else {
        return Err(Error::AuthenticationFailed(
            "client credentials are not configured".to_string(),
        ));
    };
    let Some(endpoint) = config.token_endpoint()? else {
        return Err(Error::AuthenticationFailed(
            "no token endpoint available".to_string(),
        ));
    };

    let client = Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()?;
    let request = TokenRequest::client_credentials(client_id, client_secret, scope.as_deref());
    let response = client.post(endpoint).form(&request).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::AuthenticationFailed(format!(
            "token endpoint returned {status}: {}",
            ErrorResponse::message_from_body(&body)
        )));
    }
    let token = response.json::<TokenResponse>().await?;
    Ok(token.access_token)
}
