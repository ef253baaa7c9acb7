//! Pure translation from verified Stripe event payloads to persistence intents.
//!
//! Stripe reports period boundaries in epoch seconds; every path converts
//! them through [`epoch_seconds_to_datetime`].

use chrono::{DateTime, Utc};
use relay::{
    domain::{
        entities::subscriptions::{InsertSubscriptionEntity, UpdateSubscriptionPeriodEntity},
        value_objects::enums::subscription_statuses::SubscriptionStatus,
    },
    payments::stripe_client::{StripeCheckoutSession, StripeSubscription},
};

use super::stripe_webhook::WebhookError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
}

/// Stripe event type tags handled by the relay. Anything else is acknowledged and ignored.
const EVENT_KINDS: &[(&str, EventKind)] = &[
    ("checkout.session.completed", EventKind::CheckoutSessionCompleted),
    ("customer.subscription.created", EventKind::SubscriptionCreated),
    ("customer.subscription.updated", EventKind::SubscriptionUpdated),
    ("customer.subscription.deleted", EventKind::SubscriptionDeleted),
];

impl EventKind {
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        EVENT_KINDS
            .iter()
            .find(|(name, _)| *name == event_type)
            .map(|(_, kind)| *kind)
    }

    pub fn as_str(&self) -> &'static str {
        EVENT_KINDS
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceIntent {
    Insert(InsertSubscriptionEntity),
    UpdatePeriod {
        stripe_subscription_id: String,
        changes: UpdateSubscriptionPeriodEntity,
    },
    MarkCanceled {
        stripe_subscription_id: String,
    },
    LogOnly {
        stripe_subscription_id: String,
    },
}

/// The identifiers a completed checkout session carries on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReference {
    pub user_id: String,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
}

pub fn epoch_seconds_to_datetime(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(seconds.checked_mul(1000)?)
}

pub fn checkout_reference(
    session: &StripeCheckoutSession,
) -> Result<CheckoutReference, WebhookError> {
    let user_id = required(session.client_reference_id.as_deref(), "client_reference_id")?;
    let stripe_subscription_id = required(
        session.subscription.as_ref().map(|s| s.id()),
        "subscription",
    )?;
    let stripe_customer_id = required(session.customer.as_ref().map(|c| c.id()), "customer")?;

    Ok(CheckoutReference {
        user_id: user_id.to_string(),
        stripe_subscription_id: stripe_subscription_id.to_string(),
        stripe_customer_id: stripe_customer_id.to_string(),
    })
}

/// Builds the row for a completed checkout from the session identifiers and
/// the subscription fetched from Stripe.
pub fn map_checkout_completed(
    reference: CheckoutReference,
    subscription: &StripeSubscription,
) -> Result<PersistenceIntent, WebhookError> {
    let price_id = required(subscription.first_price_id(), "items.data[0].price.id")?;
    let status = parse_status(subscription.status.as_deref())?;
    let current_period_end = period_end(subscription)?;
    let current_period_start = subscription
        .period_start()
        .and_then(epoch_seconds_to_datetime);

    Ok(PersistenceIntent::Insert(InsertSubscriptionEntity {
        user_id: reference.user_id,
        stripe_subscription_id: reference.stripe_subscription_id,
        stripe_customer_id: reference.stripe_customer_id,
        price_id: price_id.to_string(),
        plan_id: subscription.first_plan_id().map(str::to_string),
        status: status.to_string(),
        current_period_end,
        current_period_start,
        cancel_at_period_end: subscription.cancel_at_period_end.unwrap_or(false),
    }))
}

pub fn map_subscription_created(
    subscription: &StripeSubscription,
) -> Result<PersistenceIntent, WebhookError> {
    let stripe_subscription_id = required(subscription.id.as_deref(), "id")?;
    Ok(PersistenceIntent::LogOnly {
        stripe_subscription_id: stripe_subscription_id.to_string(),
    })
}

pub fn map_subscription_updated(
    subscription: &StripeSubscription,
) -> Result<PersistenceIntent, WebhookError> {
    let stripe_subscription_id = required(subscription.id.as_deref(), "id")?;
    let status = parse_status(subscription.status.as_deref())?;
    let current_period_end = period_end(subscription)?;
    let cancel_at_period_end = subscription
        .cancel_at_period_end
        .ok_or_else(|| WebhookError::MalformedEvent("missing cancel_at_period_end".to_string()))?;

    Ok(PersistenceIntent::UpdatePeriod {
        stripe_subscription_id: stripe_subscription_id.to_string(),
        changes: UpdateSubscriptionPeriodEntity {
            status: status.to_string(),
            current_period_end,
            cancel_at_period_end,
        },
    })
}

pub fn map_subscription_deleted(
    subscription: &StripeSubscription,
) -> Result<PersistenceIntent, WebhookError> {
    let stripe_subscription_id = required(subscription.id.as_deref(), "id")?;
    Ok(PersistenceIntent::MarkCanceled {
        stripe_subscription_id: stripe_subscription_id.to_string(),
    })
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, WebhookError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WebhookError::MalformedEvent(format!("missing {field}")))
}

fn parse_status(raw: Option<&str>) -> Result<SubscriptionStatus, WebhookError> {
    let raw = required(raw, "status")?;
    SubscriptionStatus::try_from(raw).map_err(WebhookError::MalformedEvent)
}

fn period_end(subscription: &StripeSubscription) -> Result<DateTime<Utc>, WebhookError> {
    let seconds = subscription
        .period_end()
        .ok_or_else(|| WebhookError::MalformedEvent("missing current_period_end".to_string()))?;
    epoch_seconds_to_datetime(seconds).ok_or_else(|| {
        WebhookError::MalformedEvent(format!("current_period_end out of range: {seconds}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn subscription(value: serde_json::Value) -> StripeSubscription {
        serde_json::from_value(value).unwrap()
    }

    fn session(value: serde_json::Value) -> StripeCheckoutSession {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn event_kinds_resolve_from_type_tags() {
        assert_eq!(
            EventKind::from_event_type("checkout.session.completed"),
            Some(EventKind::CheckoutSessionCompleted)
        );
        assert_eq!(
            EventKind::from_event_type("customer.subscription.deleted"),
            Some(EventKind::SubscriptionDeleted)
        );
        assert_eq!(EventKind::from_event_type("invoice.paid"), None);
        assert_eq!(
            EventKind::SubscriptionUpdated.as_str(),
            "customer.subscription.updated"
        );
    }

    #[test]
    fn epoch_seconds_convert_to_utc() {
        assert_eq!(
            epoch_seconds_to_datetime(1_735_689_600),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(epoch_seconds_to_datetime(i64::MAX), None);
    }

    #[test]
    fn checkout_reference_requires_all_identifiers() {
        let reference = checkout_reference(&session(json!({
            "id": "cs_test_1",
            "client_reference_id": "user_abc",
            "subscription": "sub_123",
            "customer": "cus_123",
        })))
        .unwrap();
        assert_eq!(reference.user_id, "user_abc");
        assert_eq!(reference.stripe_subscription_id, "sub_123");
        assert_eq!(reference.stripe_customer_id, "cus_123");

        let err = checkout_reference(&session(json!({
            "id": "cs_test_1",
            "subscription": "sub_123",
            "customer": "cus_123",
        })))
        .unwrap_err();
        assert!(err.to_string().contains("client_reference_id"));
    }

    #[test]
    fn checkout_completed_uses_fetched_subscription() {
        let reference = CheckoutReference {
            user_id: "user_abc".to_string(),
            stripe_subscription_id: "sub_123".to_string(),
            stripe_customer_id: "cus_123".to_string(),
        };
        let fetched = subscription(json!({
            "id": "sub_123",
            "status": "trialing",
            "current_period_start": 1_733_011_200,
            "current_period_end": 1_735_689_600,
            "cancel_at_period_end": false,
            "items": { "data": [{ "price": { "id": "price_123" }, "plan": { "id": "plan_legacy" } }] }
        }));

        let intent = map_checkout_completed(reference, &fetched).unwrap();

        let PersistenceIntent::Insert(entity) = intent else {
            panic!("expected insert intent");
        };
        assert_eq!(entity.user_id, "user_abc");
        assert_eq!(entity.price_id, "price_123");
        assert_eq!(entity.plan_id.as_deref(), Some("plan_legacy"));
        assert_eq!(entity.status, "trialing");
        assert_eq!(
            entity.current_period_end,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            entity.current_period_start,
            Some(Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn checkout_completed_without_line_items_is_malformed() {
        let reference = CheckoutReference {
            user_id: "user_abc".to_string(),
            stripe_subscription_id: "sub_123".to_string(),
            stripe_customer_id: "cus_123".to_string(),
        };
        let fetched = subscription(json!({
            "id": "sub_123",
            "status": "active",
            "current_period_end": 1_735_689_600,
        }));

        let err = map_checkout_completed(reference, &fetched).unwrap_err();

        assert!(matches!(err, WebhookError::MalformedEvent(_)));
    }

    #[test]
    fn subscription_updated_maps_period_fields_only() {
        let intent = map_subscription_updated(&subscription(json!({
            "id": "sub_123",
            "status": "past_due",
            "current_period_end": 1_735_689_600,
            "cancel_at_period_end": true,
        })))
        .unwrap();

        assert_eq!(
            intent,
            PersistenceIntent::UpdatePeriod {
                stripe_subscription_id: "sub_123".to_string(),
                changes: UpdateSubscriptionPeriodEntity {
                    status: "past_due".to_string(),
                    current_period_end: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                    cancel_at_period_end: true,
                },
            }
        );
    }

    #[test]
    fn subscription_updated_rejects_unknown_status() {
        let err = map_subscription_updated(&subscription(json!({
            "id": "sub_123",
            "status": "frozen",
            "current_period_end": 1_735_689_600,
            "cancel_at_period_end": false,
        })))
        .unwrap_err();

        assert!(matches!(err, WebhookError::MalformedEvent(msg) if msg.contains("frozen")));
    }

    #[test]
    fn subscription_deleted_only_needs_id() {
        let intent = map_subscription_deleted(&subscription(json!({ "id": "sub_789" }))).unwrap();
        assert_eq!(
            intent,
            PersistenceIntent::MarkCanceled {
                stripe_subscription_id: "sub_789".to_string()
            }
        );

        let err = map_subscription_deleted(&subscription(json!({}))).unwrap_err();
        assert!(matches!(err, WebhookError::MalformedEvent(_)));
    }
}
