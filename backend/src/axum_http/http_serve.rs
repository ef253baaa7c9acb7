use crate::{
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
    usecases::{
        checkout::CheckoutUseCase, stripe_gateway::StripeGateway,
        stripe_webhook::StripeWebhookUseCase,
    },
};
use anyhow::Result;
use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::get,
};
use relay::domain::repositories::subscriptions::SubscriptionRepository;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Routes only; the server layers are added in [`start`].
pub fn build_router<S, Stripe>(subscription_repo: Arc<S>, stripe_client: Arc<Stripe>) -> Router
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    let webhook_usecase = Arc::new(StripeWebhookUseCase::new(
        subscription_repo,
        Arc::clone(&stripe_client),
    ));
    let checkout_usecase = Arc::new(CheckoutUseCase::new(stripe_client));

    Router::new()
        .fallback(default_routers::not_found)
        .nest(
            "/api",
            routers::webhook::routes(webhook_usecase)
                .merge(routers::checkout::routes(checkout_usecase)),
        )
        .route("/api/health-check", get(default_routers::health_check))
}

pub async fn start<S, Stripe>(
    config: Arc<DotEnvyConfig>,
    subscription_repo: Arc<S>,
    stripe_client: Arc<Stripe>,
) -> Result<()>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Stripe: StripeGateway + 'static,
{
    let app = build_router(subscription_repo, stripe_client)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.backend_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.backend_server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.backend_server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
