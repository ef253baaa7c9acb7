use std::{collections::HashMap, sync::Arc};

use axum::http::StatusCode;
use relay::domain::value_objects::subscriptions::{CheckoutSessionDto, CreateCheckoutModel};
use thiserror::Error;
use tracing::{error, info, warn};

use super::stripe_gateway::StripeGateway;

const CHECKOUT_MODE: &str = "subscription";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Missing priceId or userId")]
    MissingFields,
    #[error("Error creating checkout session")]
    Provider(#[source] anyhow::Error),
}

impl CheckoutError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CheckoutError::MissingFields => StatusCode::BAD_REQUEST,
            CheckoutError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub struct CheckoutUseCase<Stripe>
where
    Stripe: StripeGateway + 'static,
{
    stripe_client: Arc<Stripe>,
}

impl<Stripe> CheckoutUseCase<Stripe>
where
    Stripe: StripeGateway + 'static,
{
    pub fn new(stripe_client: Arc<Stripe>) -> Self {
        Self { stripe_client }
    }

    pub async fn create_checkout_session(
        &self,
        model: CreateCheckoutModel,
    ) -> Result<CheckoutSessionDto, CheckoutError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let (Some(price_id), Some(user_id)) = (non_empty(model.price_id), non_empty(model.user_id))
        else {
            let err = CheckoutError::MissingFields;
            warn!(
                status = err.status_code().as_u16(),
                "checkout: priceId or userId missing"
            );
            return Err(err);
        };

        info!(%user_id, %price_id, "checkout: creating checkout session");

        // The webhook attributes the purchase through client_reference_id; the
        // metadata copy lets the subscription object be traced back as well.
        let metadata = HashMap::from([("user_id".to_string(), user_id.clone())]);

        let session = self
            .stripe_client
            .create_checkout_session(&price_id, CHECKOUT_MODE, &user_id, metadata)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    %price_id,
                    error = ?err,
                    "checkout: stripe checkout session creation failed"
                );
                CheckoutError::Provider(err)
            })?;

        let url = session.url.ok_or_else(|| {
            error!(
                %user_id,
                session_id = %session.id,
                "checkout: stripe returned a session without url"
            );
            CheckoutError::Provider(anyhow::anyhow!("Stripe Checkout session URL is missing"))
        })?;

        info!(%user_id, session_id = %session.id, "checkout: checkout session created");

        Ok(CheckoutSessionDto {
            session_id: session.id,
            url,
        })
    }
}
