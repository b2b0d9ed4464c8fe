use {
    crate::domain::error::PaymentError,
    rust_decimal::Decimal,
    std::{env, str::FromStr, time::Duration},
};

/// Process configuration, read from the environment after `.env` is loaded.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub webhook_secret: Option<String>,
    pub max_payment_amount: Decimal,
    pub allow_terminal_overwrite: bool,
    pub gateway_latency: Duration,
    pub gateway_failure_rate: f64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, PaymentError> {
        let gateway_failure_rate: f64 = parse_or("GATEWAY_FAILURE_RATE", 0.0)?;
        if !(0.0..=1.0).contains(&gateway_failure_rate) {
            return Err(PaymentError::Validation(format!(
                "GATEWAY_FAILURE_RATE must be within 0..=1, got {gateway_failure_rate}"
            )));
        }

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            webhook_secret: non_empty("GATEWAY_WEBHOOK_SECRET"),
            max_payment_amount: parse_or("MAX_PAYMENT_AMOUNT", Decimal::new(10_000_000, 0))?,
            allow_terminal_overwrite: parse_or("ALLOW_TERMINAL_OVERWRITE", false)?,
            gateway_latency: Duration::from_millis(parse_or("GATEWAY_LATENCY_MS", 500)?),
            gateway_failure_rate,
        })
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(name: &str, default: T) -> Result<T, PaymentError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PaymentError::Validation(format!("{name}={raw}: {e}"))),
    }
}
