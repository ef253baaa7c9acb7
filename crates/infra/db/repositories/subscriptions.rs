use anyhow::Result;
use async_trait::async_trait;
use diesel::{
    RunQueryDsl, insert_into,
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
    update,
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions},
};
use domain::{
    entities::subscriptions::{InsertSubscriptionEntity, UpdateSubscriptionPeriodEntity},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::{
        enums::subscription_statuses::SubscriptionStatus, subscriptions::InsertOutcome,
    },
};

/// Direct Postgres access through the r2d2 pool.
pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn insert_subscription(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> Result<InsertOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = insert_into(subscriptions::table)
            .values(&insert_subscription_entity)
            .execute(&mut conn);

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) => {
                debug!(
                    stripe_subscription_id = %insert_subscription_entity.stripe_subscription_id,
                    constraint = ?info.constraint_name(),
                    "subscriptions_postgres: unique violation on insert"
                );
                Ok(InsertOutcome::AlreadyExists)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_period_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        changes: UpdateSubscriptionPeriodEntity,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let affected = update(subscriptions::table)
            .filter(subscriptions::stripe_subscription_id.eq(stripe_subscription_id))
            .set(&changes)
            .execute(&mut conn)?;

        Ok(affected)
    }

    async fn update_status_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let affected = update(subscriptions::table)
            .filter(subscriptions::stripe_subscription_id.eq(stripe_subscription_id))
            .set(subscriptions::status.eq(status.to_string()))
            .execute(&mut conn)?;

        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use diesel::r2d2::{ConnectionManager, Pool, TestCustomizer};

    /// Single-connection pool whose connection sits inside a never-committed
    /// test transaction. `None` when `DATABASE_URL` is not configured.
    fn test_repository() -> Option<SubscriptionPostgres> {
        let database_url = std::env::var("DATABASE_URL").ok()?;
        let pool = Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(TestCustomizer))
            .build(ConnectionManager::<diesel::PgConnection>::new(database_url))
            .unwrap();
        Some(SubscriptionPostgres::new(Arc::new(pool)))
    }

    fn sample_entity() -> InsertSubscriptionEntity {
        InsertSubscriptionEntity {
            user_id: "user_abc".to_string(),
            stripe_subscription_id: "sub_redelivered_test".to_string(),
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
    async fn second_insert_of_same_subscription_reports_already_exists() {
        let Some(repo) = test_repository() else {
            return;
        };

        let first = repo.insert_subscription(sample_entity()).await.unwrap();
        let second = repo.insert_subscription(sample_entity()).await.unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn updates_for_unknown_subscription_affect_no_rows() {
        let Some(repo) = test_repository() else {
            return;
        };

        let status_rows = repo
            .update_status_by_stripe_subscription_id("sub_unknown_test", SubscriptionStatus::Canceled)
            .await
            .unwrap();
        let period_rows = repo
            .update_period_by_stripe_subscription_id(
                "sub_unknown_test",
                UpdateSubscriptionPeriodEntity {
                    status: "past_due".to_string(),
                    current_period_end: Utc.timestamp_opt(1_735_689_600, 0).unwrap(),
                    cancel_at_period_end: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(status_rows, 0);
        assert_eq!(period_rows, 0);
    }
}
