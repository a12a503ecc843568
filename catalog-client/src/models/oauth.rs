use serde::{Deserialize, Serialize};

/// Form body of an OAuth2 client-credentials token request.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<&'a str>,
}

impl<'a> TokenRequest<'a> {
    pub fn client_credentials(
        client_id: &'a str,
        client_secret: &'a str,
        scope: Option<&'a str>,
    ) -> Self {
        Self {
            grant_type: "client_credentials",
            client_id,
            client_secret,
            scope,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
