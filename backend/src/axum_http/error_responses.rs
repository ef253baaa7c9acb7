use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::usecases::{checkout::CheckoutError, stripe_webhook::WebhookError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl ErrorResponse {
    pub fn respond(status: StatusCode, message: String) -> Response {
        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });

        (status, body).into_response()
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        ErrorResponse::respond(self.status_code(), format!("Webhook Error: {self}"))
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        // Provider detail stays in the logs; Display for CheckoutError is caller-safe.
        ErrorResponse::respond(self.status_code(), self.to_string())
    }
}
