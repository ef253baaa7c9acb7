use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::infra::db::postgres::schema::subscriptions;

/// Row written when a checkout completes. `id`, `created_at` and `updated_at`
/// are filled in by the database.
#[derive(Debug, Clone, PartialEq, Insertable, Serialize)]
#[diesel(table_name = subscriptions)]
pub struct InsertSubscriptionEntity {
    pub user_id: String,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub price_id: String,
    pub plan_id: Option<String>,
    pub status: String,
    pub current_period_end: DateTime<Utc>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, PartialEq, AsChangeset, Serialize)]
#[diesel(table_name = subscriptions)]
pub struct UpdateSubscriptionPeriodEntity {
    pub status: String,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
}
