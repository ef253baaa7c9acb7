use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::subscriptions::{
    InsertSubscriptionEntity, UpdateSubscriptionPeriodEntity,
};
use crate::domain::value_objects::{
    enums::subscription_statuses::SubscriptionStatus, subscriptions::InsertOutcome,
};

/// Write-side access to the `subscriptions` table.
///
/// Update methods return the number of affected rows; zero means no record
/// carries the given `stripe_subscription_id`.
#[automock]
#[async_trait]
pub trait SubscriptionRepository {
    async fn insert_subscription(
        &self,
        insert_subscription_entity: InsertSubscriptionEntity,
    ) -> Result<InsertOutcome>;

    async fn update_period_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        changes: UpdateSubscriptionPeriodEntity,
    ) -> Result<usize>;

    async fn update_status_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<usize>;
}
