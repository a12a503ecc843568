pub mod catalog_config;
pub mod error_response;
pub mod oauth;

pub use catalog_config::CatalogConfig;
pub use error_response::{ErrorModel, ErrorResponse};
pub use oauth::{TokenRequest, TokenResponse};
