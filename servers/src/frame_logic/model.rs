use lib_frame::PowerCommand;
use serde::{Deserialize, Serialize};

/// Body of the admin power endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PowerRequest {
    pub action: PowerCommand,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
