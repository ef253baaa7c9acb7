use std::sync::Arc;

use axum::http::StatusCode;
use relay::{
    domain::{
        repositories::subscriptions::SubscriptionRepository,
        value_objects::{
            enums::subscription_statuses::SubscriptionStatus, subscriptions::InsertOutcome,
        },
    },
    payments::stripe_client::{SignatureError, StripeClient, StripeEvent, StripeSubscription},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{
    event_mapper::{self, EventKind, PersistenceIntent},
    stripe_gateway::StripeGateway,
};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing stripe-signature header")]
    MissingSignature,
    #[error("signature verification failed: {0}")]
    SignatureInvalid(#[from] SignatureError),
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("subscription lookup failed: {0}")]
    UpstreamLookupFailed(#[source] anyhow::Error),
    #[error("persistence failed: {0}")]
    PersistenceFailed(#[source] anyhow::Error),
}

impl WebhookError {
    /// Stripe retries any non-2xx delivery, so every processing failure is a 400.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::SignatureInvalid(_)
            | WebhookError::MalformedEvent(_)
            | WebhookError::UpstreamLookupFailed(_)
            | WebhookError::PersistenceFailed(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// What happened to an accepted event. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Inserted,
    /// Re-delivery of a checkout whose subscription row already exists.
    AlreadyProcessed,
    Updated { rows: usize },
    /// The update matched no row, e.g. it arrived before the checkout insert.
    NoMatchingRecord,
    LoggedOnly,
    Ignored(String),
}

pub type UseCaseResult<T> = std::result::Result<T, WebhookError>;

pub struct StripeWebhookUseCase<S, Stripe>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    subscription_repo: Arc<S>,
    stripe_client: Arc<Stripe>,
}

impl<S, Stripe> StripeWebhookUseCase<S, Stripe>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    pub fn new(subscription_repo: Arc<S>, stripe_client: Arc<Stripe>) -> Self {
        Self {
            subscription_repo,
            stripe_client,
        }
    }

    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> UseCaseResult<WebhookOutcome> {
        let signature = signature.ok_or_else(|| {
            let err = WebhookError::MissingSignature;
            warn!(
                status = err.status_code().as_u16(),
                "stripe_webhook: request without stripe-signature header"
            );
            err
        })?;

        let event = self
            .stripe_client
            .verify_webhook_signature(payload, signature)
            .map_err(|err| {
                let err = WebhookError::from(err);
                warn!(
                    error = %err,
                    status = err.status_code().as_u16(),
                    "stripe_webhook: signature verification failed"
                );
                err
            })?;

        info!(
            event_id = ?event.id,
            event_type = %event.type_,
            livemode = ?event.livemode,
            "stripe_webhook: event verified"
        );

        let Some(kind) = EventKind::from_event_type(&event.type_) else {
            debug!(event_type = %event.type_, "stripe_webhook: unhandled event type");
            return Ok(WebhookOutcome::Ignored(event.type_));
        };

        let intent = self.map_event(kind, &event).await.map_err(|err| {
            warn!(
                event_id = ?event.id,
                event_type = kind.as_str(),
                error = %err,
                status = err.status_code().as_u16(),
                "stripe_webhook: failed to map event"
            );
            err
        })?;

        self.persist(intent).await
    }

    /// Produces exactly one persistence intent for a handled event kind.
    pub async fn map_event(
        &self,
        kind: EventKind,
        event: &StripeEvent,
    ) -> UseCaseResult<PersistenceIntent> {
        match kind {
            EventKind::CheckoutSessionCompleted => self.map_checkout_completed(event).await,
            EventKind::SubscriptionCreated => {
                event_mapper::map_subscription_created(&Self::subscription_object(event)?)
            }
            EventKind::SubscriptionUpdated => {
                event_mapper::map_subscription_updated(&Self::subscription_object(event)?)
            }
            EventKind::SubscriptionDeleted => {
                event_mapper::map_subscription_deleted(&Self::subscription_object(event)?)
            }
        }
    }

    async fn map_checkout_completed(&self, event: &StripeEvent) -> UseCaseResult<PersistenceIntent> {
        let session = StripeClient::extract_checkout_session(event).ok_or_else(|| {
            WebhookError::MalformedEvent("invalid checkout session payload".to_string())
        })?;
        let reference = event_mapper::checkout_reference(&session)?;

        info!(
            user_id = %reference.user_id,
            subscription_id = %reference.stripe_subscription_id,
            session_id = ?session.id,
            "stripe_webhook: retrieving subscription for completed checkout"
        );

        let subscription = self
            .stripe_client
            .retrieve_subscription(&reference.stripe_subscription_id)
            .await
            .map_err(|err| {
                error!(
                    subscription_id = %reference.stripe_subscription_id,
                    error = ?err,
                    "stripe_webhook: failed to retrieve subscription from stripe"
                );
                WebhookError::UpstreamLookupFailed(err)
            })?;

        event_mapper::map_checkout_completed(reference, &subscription)
    }

    async fn persist(&self, intent: PersistenceIntent) -> UseCaseResult<WebhookOutcome> {
        match intent {
            PersistenceIntent::Insert(entity) => {
                let subscription_id = entity.stripe_subscription_id.clone();
                let user_id = entity.user_id.clone();
                let outcome = self
                    .subscription_repo
                    .insert_subscription(entity)
                    .await
                    .map_err(|err| {
                        error!(
                            %subscription_id,
                            %user_id,
                            db_error = ?err,
                            "stripe_webhook: failed to insert subscription"
                        );
                        WebhookError::PersistenceFailed(err)
                    })?;

                match outcome {
                    InsertOutcome::Inserted => {
                        info!(%subscription_id, %user_id, "stripe_webhook: subscription created");
                        Ok(WebhookOutcome::Inserted)
                    }
                    InsertOutcome::AlreadyExists => {
                        warn!(
                            %subscription_id,
                            %user_id,
                            "stripe_webhook: subscription already recorded, treating as processed"
                        );
                        Ok(WebhookOutcome::AlreadyProcessed)
                    }
                }
            }
            PersistenceIntent::UpdatePeriod {
                stripe_subscription_id,
                changes,
            } => {
                info!(
                    subscription_id = %stripe_subscription_id,
                    status = %changes.status,
                    current_period_end = %changes.current_period_end,
                    cancel_at_period_end = changes.cancel_at_period_end,
                    "stripe_webhook: updating subscription period"
                );
                let rows = self
                    .subscription_repo
                    .update_period_by_stripe_subscription_id(&stripe_subscription_id, changes)
                    .await
                    .map_err(|err| {
                        error!(
                            subscription_id = %stripe_subscription_id,
                            db_error = ?err,
                            "stripe_webhook: failed to update subscription period"
                        );
                        WebhookError::PersistenceFailed(err)
                    })?;
                Ok(Self::update_outcome(&stripe_subscription_id, rows))
            }
            PersistenceIntent::MarkCanceled {
                stripe_subscription_id,
            } => {
                info!(
                    subscription_id = %stripe_subscription_id,
                    "stripe_webhook: marking subscription canceled"
                );
                let rows = self
                    .subscription_repo
                    .update_status_by_stripe_subscription_id(
                        &stripe_subscription_id,
                        SubscriptionStatus::Canceled,
                    )
                    .await
                    .map_err(|err| {
                        error!(
                            subscription_id = %stripe_subscription_id,
                            db_error = ?err,
                            "stripe_webhook: failed to mark subscription canceled"
                        );
                        WebhookError::PersistenceFailed(err)
                    })?;
                Ok(Self::update_outcome(&stripe_subscription_id, rows))
            }
            PersistenceIntent::LogOnly {
                stripe_subscription_id,
            } => {
                // Rows are created from checkout.session.completed only.
                info!(
                    subscription_id = %stripe_subscription_id,
                    "stripe_webhook: subscription created at stripe, awaiting checkout completion"
                );
                Ok(WebhookOutcome::LoggedOnly)
            }
        }
    }

    fn update_outcome(stripe_subscription_id: &str, rows: usize) -> WebhookOutcome {
        if rows == 0 {
            warn!(
                subscription_id = %stripe_subscription_id,
                "stripe_webhook: no subscription row matched, nothing updated"
            );
            WebhookOutcome::NoMatchingRecord
        } else {
            WebhookOutcome::Updated { rows }
        }
    }

    fn subscription_object(event: &StripeEvent) -> UseCaseResult<StripeSubscription> {
        StripeClient::extract_subscription(event).ok_or_else(|| {
            WebhookError::MalformedEvent("invalid subscription payload".to_string())
        })
    }
}
