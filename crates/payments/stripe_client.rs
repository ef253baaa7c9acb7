use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::error;

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Maximum age of a webhook signature timestamp, matching Stripe's SDK default.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Minimal Stripe client built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub livemode: Option<bool>,
    pub api_version: Option<String>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// A reference that Stripe returns either as a bare id or, when expanded, as an object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StripeExpandable {
    Id(String),
    Object { id: String },
}

impl StripeExpandable {
    pub fn id(&self) -> &str {
        match self {
            StripeExpandable::Id(id) => id,
            StripeExpandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: Option<String>,
    pub mode: Option<String>,
    pub client_reference_id: Option<String>,
    pub subscription: Option<StripeExpandable>,
    pub customer: Option<StripeExpandable>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorEnvelope {
    #[serde(default)]
    error: StripeErrorBody,
}

/// The `error` object of a non-2xx Stripe API response.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StripeErrorBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub param: Option<String>,
}

#[derive(Debug, Error)]
#[error("stripe {operation} failed with {status}: {}", .body.message.as_deref().unwrap_or("no error message"))]
pub struct StripeApiError {
    pub operation: &'static str,
    pub status: reqwest::StatusCode,
    pub request_id: Option<String>,
    pub body: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: Option<String>,
    pub customer: Option<StripeExpandable>,
    pub status: Option<String>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: Option<bool>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub price: Option<StripeObjectRef>,
    pub plan: Option<StripeObjectRef>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripeObjectRef {
    pub id: String,
}

impl StripeSubscription {
    /// Returns the subscription period start timestamp, falling back to the first item
    /// when the top-level field is absent.
    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start.or_else(|| {
            self.items
                .data
                .first()
                .and_then(|item| item.current_period_start)
        })
    }

    /// Returns the subscription period end timestamp, falling back to the first item when needed.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .first()
                .and_then(|item| item.current_period_end)
        })
    }

    pub fn first_price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.as_str())
    }

    pub fn first_plan_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.plan.as_ref())
            .map(|plan| plan.id.as_str())
    }
}

/// Why a `stripe-signature` header was rejected.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("missing timestamp in stripe-signature")]
    MissingTimestamp,
    #[error("invalid timestamp in stripe-signature")]
    InvalidTimestamp,
    #[error("missing v1 in stripe-signature")]
    MissingSignature,
    #[error("timestamp outside the tolerance zone")]
    TimestampOutsideTolerance,
    #[error("no signatures found matching the expected signature for payload")]
    NoMatchingSignature,
    #[error("invalid webhook secret")]
    InvalidSecret,
    #[error("invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl StripeClient {
    pub fn new(
        secret_key: String,
        webhook_secret: String,
        success_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: STRIPE_API_BASE.to_string(),
            secret_key,
            webhook_secret,
            success_url,
            cancel_url,
        }
    }

    /// Points the client at another API host, e.g. stripe-mock.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Turns a non-2xx response into a [`StripeApiError`], logging what Stripe reported.
    async fn into_success(
        resp: reqwest::Response,
        operation: &'static str,
    ) -> std::result::Result<reqwest::Response, StripeApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let raw = resp.text().await.unwrap_or_default();
        let body = serde_json::from_str::<StripeErrorEnvelope>(&raw)
            .unwrap_or_default()
            .error;

        error!(
            %operation,
            %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?body.kind,
            stripe_error_code = ?body.code,
            stripe_error_param = ?body.param,
            stripe_error_message = ?body.message,
            "stripe api request failed"
        );

        Err(StripeApiError {
            operation,
            status,
            request_id,
            body,
        })
    }

    /// Creates a Checkout Session. `client_reference_id` is echoed back on
    /// `checkout.session.completed` and is how the webhook attributes the purchase.
    pub async fn create_checkout_session(
        &self,
        price_id: &str,
        mode: &str,
        client_reference_id: &str,
        metadata: HashMap<String, String>,
    ) -> Result<CreatedCheckoutSession> {
        // https://stripe.com/docs/api/checkout/sessions/create
        let mut form = vec![
            ("mode".to_string(), mode.to_string()),
            ("line_items[0][price]".to_string(), price_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("client_reference_id".to_string(), client_reference_id.to_string()),
        ];
        // Copy metadata onto the subscription too so later subscription events carry it.
        let copy_to_subscription = mode == "subscription";
        for (key, value) in metadata {
            if copy_to_subscription {
                form.push((format!("subscription_data[metadata][{key}]"), value.clone()));
            }
            form.push((format!("metadata[{key}]"), value));
        }

        let resp = self
            .http
            .post(self.endpoint("checkout/sessions"))
            .header(AUTHORIZATION, self.bearer())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&form)
            .send()
            .await
            .context("stripe checkout session request failed")?;
        let session = Self::into_success(resp, "checkout session creation")
            .await?
            .json::<CreatedCheckoutSession>()
            .await
            .context("failed to decode stripe checkout session")?;

        Ok(session)
    }

    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        // https://stripe.com/docs/api/subscriptions/retrieve
        let resp = self
            .http
            .get(self.endpoint(&format!("subscriptions/{subscription_id}")))
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .context("stripe subscription request failed")?;
        let subscription = Self::into_success(resp, "subscription retrieval")
            .await?
            .json::<StripeSubscription>()
            .await
            .context("failed to decode stripe subscription")?;

        Ok(subscription)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.api_base)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }

    /// Verifies the webhook signature. https://stripe.com/docs/webhooks/signatures
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> std::result::Result<StripeEvent, SignatureError> {
        self.verify_webhook_signature_at(payload, signature_header, Utc::now().timestamp())
    }

    pub fn verify_webhook_signature_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> std::result::Result<StripeEvent, SignatureError> {
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => signatures.push(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
        if signatures.is_empty() {
            return Err(SignatureError::MissingSignature);
        }
        let signed_at: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;

        // The raw bytes are signed as-is; never re-encode them.
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);

        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|provided| mac.clone().verify_slice(&provided).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(SignatureError::NoMatchingSignature);
        }

        if now.saturating_sub(signed_at) > WEBHOOK_TOLERANCE_SECS {
            return Err(SignatureError::TimestampOutsideTolerance);
        }

        let event: StripeEvent = serde_json::from_slice(payload)?;
        Ok(event)
    }

    pub fn extract_checkout_session(event: &StripeEvent) -> Option<StripeCheckoutSession> {
        serde_json::from_value(event.data.object.clone()).ok()
    }

    pub fn extract_subscription(event: &StripeEvent) -> Option<StripeSubscription> {
        serde_json::from_value(event.data.object.clone()).ok()
    }
}
