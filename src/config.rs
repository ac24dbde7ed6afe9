use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expires_hours: i64,
    pub session_ttl_secs: u64,
    pub otp_ttl_secs: u64,
    pub reset_token_ttl_mins: i64,
    /// Base URL used when building links in outgoing emails.
    pub public_url: String,
    pub email_from: String,
    pub email_queue_capacity: usize,
    pub mailgun_api_key: Option<String>,
    pub mailgun_domain: Option<String>,
    pub opencage_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", 3000);
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://{host}:{port}"));

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expires_hours: parse_or("JWT_EXPIRES_HOURS", 4),
            session_ttl_secs: parse_or("SESSION_TTL_SECS", 60 * 60 * 4),
            otp_ttl_secs: parse_or("OTP_TTL_SECS", 60 * 5),
            reset_token_ttl_mins: parse_or("RESET_TOKEN_TTL_MINS", 10),
            public_url,
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Bookings <no-reply@localhost>".to_string()),
            email_queue_capacity: parse_or("EMAIL_QUEUE_CAPACITY", 1024),
            mailgun_api_key: non_empty("MAILGUN_API_KEY"),
            mailgun_domain: non_empty("MAILGUN_DOMAIN"),
            opencage_api_key: non_empty("OPENCAGE_API_KEY"),
            host,
            port,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
