use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use relay::domain::repositories::subscriptions::SubscriptionRepository;
use serde_json::json;
use tracing::info;

use crate::usecases::{stripe_gateway::StripeGateway, stripe_webhook::StripeWebhookUseCase};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes<S, Stripe>(usecase: Arc<StripeWebhookUseCase<S, Stripe>>) -> Router
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    Router::new()
        .route("/webhook", post(stripe_webhook::<S, Stripe>))
        .route("/webhook-test", get(webhook_test))
        .with_state(usecase)
}

/// Takes the body as raw bytes: the signature covers the exact payload Stripe sent.
pub async fn stripe_webhook<S, Stripe>(
    State(usecase): State<Arc<StripeWebhookUseCase<S, Stripe>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match usecase.handle_stripe_webhook(&body, signature).await {
        Ok(outcome) => {
            info!(outcome = ?outcome, "stripe_webhook router: event acknowledged");
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub async fn webhook_test() -> impl IntoResponse {
    Json(json!({ "status": "Webhook endpoint is working" }))
}
