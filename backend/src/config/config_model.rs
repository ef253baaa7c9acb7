use url::Url;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub stripe: Stripe,
    pub supabase: Supabase,
    pub database: Option<Database>,
    pub app: App,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    /// Request body limit in MiB.
    pub body_limit: u64,
    /// Request timeout in seconds.
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Stripe {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Supabase {
    pub project_url: Url,
    pub service_role_key: String,
}

/// Direct Postgres connection; when present it replaces the Supabase REST path.
#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct App {
    pub public_url: Url,
}

impl App {
    fn base(&self) -> &str {
        self.public_url.as_str().trim_end_matches('/')
    }

    /// Stripe substitutes `{CHECKOUT_SESSION_ID}` itself, so it must stay unencoded.
    pub fn checkout_success_url(&self) -> String {
        format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", self.base())
    }

    pub fn checkout_cancel_url(&self) -> String {
        format!("{}/cancel", self.base())
    }
}
