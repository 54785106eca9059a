//! Backend response envelope
//!
//! Every REST endpoint wraps its payload as
//! `{ "statusCode": 200, "data": ..., "message": "Success" }`.
//! Error responses carry `data: null` and a human-readable message.

use serde::{Deserialize, Serialize};

/// Standard response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status_code: u16,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
}

impl<T> ApiResponse<T> {
    /// Payload, or `T::default()` when the server sent `null`.
    pub fn into_data_or_default(self) -> T
    where
        T: Default,
    {
        self.data.unwrap_or_default()
    }
}
