//! Strongly-typed startup configuration, loaded from the environment with a
//! `.env` file fallback. Mirrors the teacher's `ServerConfig` (default-heavy,
//! constructed once) generalized to the full tunable set spec.md §4-§6 names.

use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_per_minute: u32,
    pub game_action_per_second: u32,
    pub chat_per_minute: u32,
    pub api_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_per_minute: 5,
            game_action_per_second: 10,
            chat_per_minute: 60,
            api_per_minute: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub send_queue_high_water_frames: usize,
    pub send_queue_high_water_bytes: usize,
    pub max_frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30,
            send_queue_high_water_frames: 256,
            send_queue_high_water_bytes: 4 * 1024 * 1024,
            max_frame_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub tick_rate_hz: u32,
    pub snapshot_interval_ms: u64,
    pub snapshot_retention_ms: u64,
    pub rewind_extrapolation_ms: u64,
    pub rollback_horizon_ticks: u32,
    pub max_input_buffer_secs: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            snapshot_interval_ms: 16,
            snapshot_retention_ms: 5_000,
            rewind_extrapolation_ms: 200,
            rollback_horizon_ticks: 8,
            max_input_buffer_secs: 2.0,
        }
    }
}

impl SimulationConfig {
    pub fn tick_period_ms(&self) -> u64 {
        1000 / self.tick_rate_hz as u64
    }

    /// Per Open Question #2 in SPEC_FULL.md: fail fast on inconsistent tunables
    /// rather than letting the rewind/rollback windows silently undershoot.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.snapshot_interval_ms > self.rewind_extrapolation_ms + self.snapshot_retention_ms {
            return Err(ServerError::Config(
                "snapshot_interval_ms must be <= rewind budget".into(),
            ));
        }
        let rollback_span_ms = self.rollback_horizon_ticks as u64 * self.tick_period_ms();
        if rollback_span_ms > self.snapshot_retention_ms {
            return Err(ServerError::Config(
                "rollback_horizon_ticks * tick_period_ms must be <= retention".into(),
            ));
        }
        Ok(())
    }
}

/// Certificate/key paths for the TLS-over-TCP reliable channel. Required in
/// production; in development a self-signed pair may be pointed to instead.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub worker_threads: usize,
    pub max_connections: usize,
    pub jwt_secret: String,
    pub rate_limiting_enabled: bool,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
    pub simulation: SimulationConfig,
    pub tls: TlsConfig,
}

impl Config {
    /// Mirrors `EnvironmentConfig::LoadConfiguration`: load `.env` (if present),
    /// then let real process environment variables override it.
    pub fn load() -> Result<Self, ServerError> {
        dotenvy::dotenv().ok();

        let environment = Environment::parse(
            &std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let rate_limiting_enabled = std::env::var("RATE_LIMITING_ENABLED")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(environment.is_production());

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| ServerError::Config("JWT_SECRET is required".into()))?;

        let min_len = if environment.is_production() { 64 } else { 32 };
        if jwt_secret.len() < min_len {
            return Err(ServerError::Config(format!(
                "JWT_SECRET must be at least {min_len} characters in {environment:?}"
            )));
        }

        if environment.is_production() && !rate_limiting_enabled {
            return Err(ServerError::Config(
                "rate limiting must be enabled in production".into(),
            ));
        }

        let tls = TlsConfig {
            cert_path: std::env::var("TLS_CERT_PATH").unwrap_or_else(|_| "cert.pem".to_string()),
            key_path: std::env::var("TLS_KEY_PATH").unwrap_or_else(|_| "key.pem".to_string()),
        };

        let config = Self {
            environment,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8081),
            worker_threads: std::env::var("WORKER_THREADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)),
            max_connections: std::env::var("MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            jwt_secret,
            rate_limiting_enabled,
            rate_limit: RateLimitConfig::default(),
            session: SessionConfig::default(),
            simulation: SimulationConfig::default(),
            tls,
        };

        config.simulation.validate()?;

        if !(100..=10_000).contains(&config.max_connections) {
            return Err(ServerError::Config(
                "MAX_CONNECTIONS must be between 100 and 10000".into(),
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_secret_in_production() {
        // SAFETY: tests run single-threaded within this module for env mutation.
        unsafe {
            std::env::set_var("APP_ENV", "production");
            std::env::set_var("JWT_SECRET", "short-secret");
        }
        let result = Config::load();
        unsafe {
            std::env::remove_var("APP_ENV");
            std::env::remove_var("JWT_SECRET");
        }
        assert!(result.is_err());
    }

    #[test]
    fn simulation_config_validates_defaults() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn simulation_config_rejects_oversized_rollback() {
        let mut cfg = SimulationConfig::default();
        cfg.rollback_horizon_ticks = 10_000;
        assert!(cfg.validate().is_err());
    }
}
