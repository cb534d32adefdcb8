use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Ceiling on a client's `max_iterations`.
    pub max_iterations_limit: u32,
    /// Ceiling on a client's `timeout_ms_per_attempt`.
    pub max_attempt_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: parse_env("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            max_iterations_limit: parse_env("SOLVER_MAX_ITERATIONS_LIMIT", 500)
                .context("SOLVER_MAX_ITERATIONS_LIMIT must be a non-negative integer")?,
            max_attempt_timeout_ms: parse_env("SOLVER_MAX_ATTEMPT_TIMEOUT_MS", 120_000)
                .context("SOLVER_MAX_ATTEMPT_TIMEOUT_MS must be a non-negative integer")?,
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value '{raw}' for '{key}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_default_when_unset() {
        let value: u32 = parse_env("SOLVER_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_parse_env_reads_value() {
        std::env::set_var("SOLVER_TEST_PARSE_OK", " 42 ");
        let value: u64 = parse_env("SOLVER_TEST_PARSE_OK", 0).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("SOLVER_TEST_PARSE_BAD", "lots");
        let err = parse_env::<u16>("SOLVER_TEST_PARSE_BAD", 1).unwrap_err();
        assert!(err.to_string().contains("SOLVER_TEST_PARSE_BAD"));
    }
}
