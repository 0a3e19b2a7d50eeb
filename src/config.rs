use std::env;

/// Process configuration, read once at startup from the environment (with
/// `.env` support via dotenvy in `main`). `demo_mode` is threaded explicitly
/// into the read-side authorization check; it is never a global.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub amqp_host: String,
    pub amqp_port: u16,
    pub amqp_user: String,
    pub amqp_password: String,
    pub demo_mode: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL should be set"),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            amqp_host: env::var("AMQP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            amqp_port: env::var("AMQP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5672),
            amqp_user: env::var("AMQP_USER").unwrap_or_else(|_| "guest".to_string()),
            amqp_password: env::var("AMQP_PASSWORD").unwrap_or_else(|_| "guest".to_string()),
            demo_mode: env::var("DEMO_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}
