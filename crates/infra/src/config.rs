use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub surreal_endpoint: String,
    pub surreal_ns: String,
    pub surreal_db: String,
    pub surreal_user: String,
    pub surreal_pass: String,
    pub jwt_secret: String,
    pub gateway_ack_timeout_ms: u64,
    pub gateway_heartbeat_secs: u64,
    pub http_timeout_secs: u64,
    /// JSON fixture of users, vendors and bookings for the memory backend.
    #[serde(default)]
    pub memory_seed_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("surreal_endpoint", "ws://127.0.0.1:8000")?
            .set_default("surreal_ns", "tripmate")?
            .set_default("surreal_db", "chat")?
            .set_default("surreal_user", "root")?
            .set_default("surreal_pass", "root")?
            .set_default("jwt_secret", "dev-secret")?
            .set_default("gateway_ack_timeout_ms", 10_000)?
            .set_default("gateway_heartbeat_secs", 15)?
            .set_default("http_timeout_secs", 30)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    /// Defaults suitable for in-process tests: memory backend, no rate limit.
    pub fn for_tests() -> Self {
        Self {
            app_env: "test".to_string(),
            port: 0,
            log_level: "warn".to_string(),
            data_backend: "memory".to_string(),
            surreal_endpoint: "ws://127.0.0.1:8000".to_string(),
            surreal_ns: "tripmate".to_string(),
            surreal_db: "chat_test".to_string(),
            surreal_user: "root".to_string(),
            surreal_pass: "root".to_string(),
            jwt_secret: "test-secret".to_string(),
            gateway_ack_timeout_ms: 2_000,
            gateway_heartbeat_secs: 15,
            http_timeout_secs: 30,
            memory_seed_path: None,
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn is_test(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("test")
    }

    pub fn backend(&self) -> Result<DataBackend, config::ConfigError> {
        match self.data_backend.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(DataBackend::Memory),
            "surreal" | "surrealdb" => Ok(DataBackend::Surreal),
            other => Err(config::ConfigError::Message(format!(
                "unsupported data_backend '{other}', expected memory or surreal"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBackend {
    Memory,
    Surreal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_accepts_both_surreal_spellings() {
        let mut config = AppConfig::for_tests();
        assert_eq!(config.backend().unwrap(), DataBackend::Memory);
        config.data_backend = "SurrealDB".into();
        assert_eq!(config.backend().unwrap(), DataBackend::Surreal);
        config.data_backend = "mongo".into();
        assert!(config.backend().is_err());
    }
}
