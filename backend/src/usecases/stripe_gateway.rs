use std::collections::HashMap;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use relay::payments::stripe_client::{
    CreatedCheckoutSession, SignatureError, StripeClient, StripeEvent, StripeSubscription,
};

/// The Stripe operations the use cases depend on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StripeGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        price_id: &str,
        mode: &str,
        client_reference_id: &str,
        metadata: HashMap<String, String>,
    ) -> AnyResult<CreatedCheckoutSession>;

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, SignatureError>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription>;
}

#[async_trait]
impl StripeGateway for StripeClient {
    async fn create_checkout_session(
        &self,
        price_id: &str,
        mode: &str,
        client_reference_id: &str,
        metadata: HashMap<String, String>,
    ) -> AnyResult<CreatedCheckoutSession> {
        self.create_checkout_session(price_id, mode, client_reference_id, metadata)
            .await
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, SignatureError> {
        self.verify_webhook_signature(payload, signature)
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription> {
        self.retrieve_subscription(subscription_id).await
    }
}
