use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::domain::{
    entities::subscriptions::{InsertSubscriptionEntity, UpdateSubscriptionPeriodEntity},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::{
        enums::subscription_statuses::SubscriptionStatus, subscriptions::InsertOutcome,
    },
};

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone)]
pub struct SupabaseRestConfig {
    pub project_url: Url,
    pub service_role_key: String,
}

/// `subscriptions` access through Supabase's PostgREST API using the service
/// role key, which bypasses row level security.
pub struct SubscriptionSupabase {
    http: reqwest::Client,
    endpoint: Url,
    service_role_key: String,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

#[derive(Serialize)]
struct StatusChange<'a> {
    status: &'a str,
}

impl SubscriptionSupabase {
    pub fn new(config: SupabaseRestConfig) -> Result<Self> {
        // PostgREST API reference: https://supabase.com/docs/guides/api
        let endpoint = config
            .project_url
            .join("rest/v1/subscriptions")
            .context("failed to build Supabase REST endpoint")?;

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            service_role_key: config.service_role_key,
        })
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint.clone())
            .header("apikey", &self.service_role_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_role_key))
            .header(CONTENT_TYPE, "application/json")
    }

    async fn read_error(resp: reqwest::Response) -> (StatusCode, Option<PostgrestError>, String) {
        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };
        let parsed = serde_json::from_str::<PostgrestError>(&body).ok();
        (status, parsed, body)
    }

    fn fail(
        status: StatusCode,
        details: Option<PostgrestError>,
        body: String,
        context: &str,
    ) -> anyhow::Error {
        let (code, message, detail, hint) = match details {
            Some(err) => (err.code, err.message, err.details, err.hint),
            None => (None, None, None, None),
        };

        error!(
            status = %status,
            postgrest_code = ?code,
            postgrest_message = ?message,
            postgrest_details = ?detail,
            postgrest_hint = ?hint,
            response_body = %body,
            context = %context,
            "supabase rest request failed"
        );

        anyhow::anyhow!(
            "Supabase REST request failed: {} (status {}, code={:?})",
            context,
            status,
            code
        )
    }

    async fn patch_matching<T: Serialize + Sync>(
        &self,
        stripe_subscription_id: &str,
        changes: &T,
        context: &str,
    ) -> Result<usize> {
        let filter = format!("eq.{stripe_subscription_id}");
        let resp = self
            .request(reqwest::Method::PATCH)
            .query(&[("stripe_subscription_id", filter.as_str()), ("select", "id")])
            .header("Prefer", "return=representation")
            .json(changes)
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, details, body) = Self::read_error(resp).await;
            return Err(Self::fail(status, details, body, context));
        }

        let rows: Vec<serde_json::Value> = resp.json().await?;
        Ok(rows.len())
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionSupabase {
    async fn insert_subscription(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> Result<InsertOutcome> {
        let resp = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=minimal")
            .json(&insert_subscription_entity)
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(InsertOutcome::Inserted);
        }

        let (status, details, body) = Self::read_error(resp).await;
        let is_duplicate = status == StatusCode::CONFLICT
            && details
                .as_ref()
                .and_then(|err| err.code.as_deref())
                .is_some_and(|code| code == UNIQUE_VIOLATION);

        if is_duplicate {
            debug!(
                stripe_subscription_id = %insert_subscription_entity.stripe_subscription_id,
                "subscriptions_supabase: unique violation on insert"
            );
            return Ok(InsertOutcome::AlreadyExists);
        }

        Err(Self::fail(status, details, body, "insert subscription"))
    }

    async fn update_period_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        changes: UpdateSubscriptionPeriodEntity,
    ) -> Result<usize> {
        self.patch_matching(stripe_subscription_id, &changes, "update subscription period")
            .await
    }

    async fn update_status_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<usize> {
        let status = status.to_string();
        self.patch_matching(
            stripe_subscription_id,
            &StatusChange { status: &status },
            "update subscription status",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;
    use serde_json::json;

    fn repository(server: &mockito::ServerGuard) -> SubscriptionSupabase {
        SubscriptionSupabase::new(SupabaseRestConfig {
            project_url: Url::parse(&server.url()).unwrap(),
            service_role_key: "service-key".to_string(),
        })
        .unwrap()
    }

    fn sample_entity() -> InsertSubscriptionEntity {
        InsertSubscriptionEntity {
            user_id: "user_abc".to_string(),
            stripe_subscription_id: "sub_123".to_string(),
            stripe_customer_id: "cus_123".to_string(),
            price_id: "price_123".to_string(),
            plan_id: None,
            status: "active".to_string(),
            current_period_end: Utc.timestamp_opt(1_735_689_600, 0).unwrap(),
            current_period_start: None,
            cancel_at_period_end: false,
        }
    }

    #[tokio::test]
    async fn insert_posts_row_with_service_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/subscriptions")
            .match_header("apikey", "service-key")
            .match_header("authorization", "Bearer service-key")
            .match_header("prefer", "return=minimal")
            .match_body(Matcher::PartialJson(json!({
                "stripe_subscription_id": "sub_123",
                "user_id": "user_abc",
                "price_id": "price_123",
                "status": "active",
            })))
            .with_status(201)
            .expect(1)
            .create_async()
            .await;

        let outcome = repository(&server)
            .insert_subscription(sample_entity())
            .await
            .unwrap();

        assert_eq!(outcome, InsertOutcome::Inserted);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn insert_reports_duplicate_as_already_exists() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/v1/subscriptions")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"code":"23505","message":"duplicate key value violates unique constraint \"subscriptions_stripe_subscription_id_key\"","details":null,"hint":null}"#,
            )
            .create_async()
            .await;

        let outcome = repository(&server)
            .insert_subscription(sample_entity())
            .await
            .unwrap();

        assert_eq!(outcome, InsertOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn insert_surfaces_other_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/v1/subscriptions")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":"PGRST204","message":"column not found"}"#)
            .create_async()
            .await;

        let result = repository(&server).insert_subscription(sample_entity()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn status_update_filters_by_stripe_subscription_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/rest/v1/subscriptions")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("stripe_subscription_id".into(), "eq.sub_123".into()),
                Matcher::UrlEncoded("select".into(), "id".into()),
            ]))
            .match_body(Matcher::Json(json!({ "status": "canceled" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":"4f7d3a52-8f43-4a51-9c55-2f0f0f6f9a10"}]"#)
            .expect(1)
            .create_async()
            .await;

        let affected = repository(&server)
            .update_status_by_stripe_subscription_id("sub_123", SubscriptionStatus::Canceled)
            .await
            .unwrap();

        assert_eq!(affected, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn period_update_returns_zero_when_no_row_matches() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PATCH", "/rest/v1/subscriptions")
            .match_query(Matcher::UrlEncoded(
                "stripe_subscription_id".into(),
                "eq.sub_789".into(),
            ))
            .match_body(Matcher::PartialJson(json!({
                "status": "past_due",
                "cancel_at_period_end": true,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let affected = repository(&server)
            .update_period_by_stripe_subscription_id(
                "sub_789",
                UpdateSubscriptionPeriodEntity {
                    status: "past_due".to_string(),
                    current_period_end: Utc.timestamp_opt(1_735_689_600, 0).unwrap(),
                    cancel_at_period_end: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(affected, 0);
    }
}
