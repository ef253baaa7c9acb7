pub mod enums;
pub mod subscriptions;
