use reqwest::header::InvalidHeaderValue;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("URL {0} cannot be used as a catalog base URL")]
    CannotBeABase(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    #[error("Failed to decode catalog response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Catalog API error (status {status}): {message}")]
    ApiError { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the catalog could not be reached at all, as opposed to answering with an error.
    pub fn is_connect(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
