use serde::{Deserialize, Serialize};

/// Error body returned by Iceberg REST catalogs for non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorModel {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: u16,
}

impl ErrorResponse {
    /// Best-effort human readable message for a raw response body.
    pub fn message_from_body(body: &str) -> String {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(response) => format!("{}: {}", response.error.error_type, response.error.message),
            Err(_) if body.is_empty() => "Unknown error".to_string(),
            Err(_) => body.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_from_iceberg_error_body() {
        let body = r#"{"error":{"message":"Table does not exist","type":"NoSuchTableException","code":404}}"#;
        assert_eq!(
            ErrorResponse::message_from_body(body),
            "NoSuchTableException: Table does not exist"
        );
    }

    #[test]
    fn test_message_from_unstructured_body() {
        assert_eq!(ErrorResponse::message_from_body("bad gateway"), "bad gateway");
        assert_eq!(ErrorResponse::message_from_body(""), "Unknown error");
    }
}
