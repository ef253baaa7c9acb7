use anyhow::Result;
use backend::axum_http::http_serve;
use backend::config::config_loader;
use relay::infra::{
    db::{postgres::postgres_connection, repositories::subscriptions::SubscriptionPostgres},
    supabase::subscriptions::{SubscriptionSupabase, SupabaseRestConfig},
};
use relay::payments::stripe_client::StripeClient;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Backend exited with error: {:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Loading first applies `.env`, which also carries the logging variables.
    let loaded = config_loader::load();
    relay::observability::init_observability("backend")?;
    relay::observability::install_fatal_panic_hook();

    let dotenvy_env = Arc::new(loaded?);
    info!("ENV has been loaded");

    let mut stripe_client = StripeClient::new(
        dotenvy_env.stripe.secret_key.clone(),
        dotenvy_env.stripe.webhook_secret.clone(),
        dotenvy_env.app.checkout_success_url(),
        dotenvy_env.app.checkout_cancel_url(),
    );
    if let Some(api_base) = &dotenvy_env.stripe.api_base {
        info!(%api_base, "Using custom Stripe API base");
        stripe_client = stripe_client.with_api_base(api_base.as_str());
    }
    let stripe_client = Arc::new(stripe_client);

    match &dotenvy_env.database {
        Some(database) => {
            let postgres_pool = postgres_connection::establish_connection(&database.url)?;
            info!("Postgres connection has been established");

            let subscription_repo = Arc::new(SubscriptionPostgres::new(Arc::new(postgres_pool)));
            http_serve::start(Arc::clone(&dotenvy_env), subscription_repo, stripe_client).await?;
        }
        None => {
            let subscription_repo = Arc::new(SubscriptionSupabase::new(SupabaseRestConfig {
                project_url: dotenvy_env.supabase.project_url.clone(),
                service_role_key: dotenvy_env.supabase.service_role_key.clone(),
            })?);
            info!(
                project_url = %dotenvy_env.supabase.project_url,
                "Using Supabase REST storage"
            );
            http_serve::start(Arc::clone(&dotenvy_env), subscription_repo, stripe_client).await?;
        }
    }

    Ok(())
}
