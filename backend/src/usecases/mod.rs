pub mod checkout;
pub mod event_mapper;
pub mod stripe_gateway;
pub mod stripe_webhook;
