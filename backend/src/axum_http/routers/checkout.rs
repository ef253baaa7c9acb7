use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use relay::domain::value_objects::subscriptions::CreateCheckoutModel;

use crate::usecases::{checkout::CheckoutUseCase, stripe_gateway::StripeGateway};

pub fn routes<Stripe>(usecase: Arc<CheckoutUseCase<Stripe>>) -> Router
where
    Stripe: StripeGateway + 'static,
{
    Router::new()
        .route("/create-checkout", post(create_checkout::<Stripe>))
        .with_state(usecase)
}

/// An unreadable body is treated like one with no fields so the caller gets the
/// same 400 as for a missing priceId or userId.
pub async fn create_checkout<Stripe>(
    State(usecase): State<Arc<CheckoutUseCase<Stripe>>>,
    body: Option<Json<CreateCheckoutModel>>,
) -> Response
where
    Stripe: StripeGateway + 'static,
{
    let model = body.map(|Json(model)| model).unwrap_or_default();

    match usecase.create_checkout_session(model).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(err) => err.into_response(),
    }
}
