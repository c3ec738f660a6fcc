use std::sync::Arc;
use std::time::Duration;

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tripmate_domain::ports::BoxFuture;
use tripmate_domain::ports::db::{DbError, StoreProbe};
use url::Url;

use crate::config::AppConfig;

/// Tables, unique constraints and lookup indexes of the chat store.
const SCHEMA: &str = "\
DEFINE TABLE IF NOT EXISTS chat SCHEMALESS;\n\
DEFINE INDEX IF NOT EXISTS chat_chat_id ON TABLE chat FIELDS chat_id UNIQUE;\n\
DEFINE INDEX IF NOT EXISTS chat_pair_key ON TABLE chat FIELDS pair_key UNIQUE;\n\
DEFINE INDEX IF NOT EXISTS chat_user_id ON TABLE chat FIELDS user_id;\n\
DEFINE INDEX IF NOT EXISTS chat_vendor_id ON TABLE chat FIELDS vendor_id;\n\
DEFINE TABLE IF NOT EXISTS chat_message SCHEMALESS;\n\
DEFINE INDEX IF NOT EXISTS chat_message_id ON TABLE chat_message FIELDS message_id UNIQUE;\n\
DEFINE INDEX IF NOT EXISTS chat_message_chat ON TABLE chat_message FIELDS chat_id, sended_time_ms;\n\
DEFINE INDEX IF NOT EXISTS chat_message_client ON TABLE chat_message FIELDS chat_id, sender_id, client_message_id;\n\
DEFINE TABLE IF NOT EXISTS app_user SCHEMALESS;\n\
DEFINE INDEX IF NOT EXISTS app_user_id ON TABLE app_user FIELDS user_id UNIQUE;\n\
DEFINE TABLE IF NOT EXISTS vendor SCHEMALESS;\n\
DEFINE INDEX IF NOT EXISTS vendor_id ON TABLE vendor FIELDS vendor_id UNIQUE;\n\
DEFINE TABLE IF NOT EXISTS booking SCHEMALESS;\n\
DEFINE INDEX IF NOT EXISTS booking_parties ON TABLE booking FIELDS user_id, vendor_id, status;\n";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
        }
    }
}

/// Opens one authenticated client shared by every Surreal repository.
pub async fn connect(db_config: &DbConfig) -> anyhow::Result<Arc<Surreal<Client>>> {
    let db = Surreal::<Client>::init();
    db.connect::<Ws>(db_config.endpoint.as_str()).await?;
    db.signin(Root {
        username: &db_config.username,
        password: &db_config.password,
    })
    .await?;
    db.use_ns(&db_config.namespace)
        .use_db(&db_config.database)
        .await?;
    tracing::info!(
        endpoint = %db_config.endpoint,
        namespace = %db_config.namespace,
        database = %db_config.database,
        "surreal connected"
    );
    Ok(Arc::new(db))
}

/// Applies [`SCHEMA`]. Every statement is idempotent.
pub async fn ensure_schema(client: &Surreal<Client>) -> anyhow::Result<()> {
    client.query(SCHEMA).await?.check()?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SurrealProbe {
    config: DbConfig,
}

impl SurrealProbe {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

impl StoreProbe for SurrealProbe {
    fn backend(&self) -> &'static str {
        "surrealdb"
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), DbError>> {
        let endpoint = self.config.endpoint.clone();
        Box::pin(async move {
            let address = parse_socket_address(&endpoint)?;
            let connect = timeout(Duration::from_secs(2), TcpStream::connect(address))
                .await
                .map_err(|_| {
                    DbError::Unreachable("surreal endpoint connect timed out".to_string())
                })?;
            connect.map_err(|err| {
                DbError::Unreachable(format!("surreal endpoint connect failed: {err}"))
            })?;
            tracing::debug!(endpoint, "surreal health check succeeded");
            Ok(())
        })
    }
}

/// The in-process store is always reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryProbe;

impl StoreProbe for MemoryProbe {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async { Ok(()) })
    }
}

fn parse_socket_address(endpoint: &str) -> Result<String, DbError> {
    let normalized = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };
    let parsed = Url::parse(&normalized).map_err(|err| {
        DbError::Misconfigured(format!("invalid surreal endpoint '{endpoint}': {err}"))
    })?;

    let host = parsed.host_str().ok_or_else(|| {
        DbError::Misconfigured(format!("missing surreal host in endpoint '{endpoint}'"))
    })?;
    let port = match parsed.scheme() {
        "wss" | "https" => parsed.port().unwrap_or(443),
        _ => parsed.port().unwrap_or(8000),
    };
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_address_defaults_by_scheme() {
        assert_eq!(
            parse_socket_address("ws://db.internal").unwrap(),
            "db.internal:8000"
        );
        assert_eq!(
            parse_socket_address("wss://db.internal").unwrap(),
            "db.internal:443"
        );
        assert_eq!(
            parse_socket_address("127.0.0.1:9000").unwrap(),
            "127.0.0.1:9000"
        );
    }

    #[test]
    fn socket_address_rejects_garbage() {
        assert!(matches!(
            parse_socket_address("ws://"),
            Err(DbError::Misconfigured(_))
        ));
    }

    #[tokio::test]
    async fn memory_probe_is_always_healthy() {
        let status = MemoryProbe.status().await;
        assert!(status.healthy);
        assert_eq!(status.backend, "memory");
    }
}
