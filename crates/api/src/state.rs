use std::sync::Arc;
use std::time::Duration;

use tripmate_domain::chat::ChatService;
use tripmate_domain::ports::booking::BookingLedger;
use tripmate_domain::ports::chat::ChatRepository;
use tripmate_domain::ports::db::StoreProbe;
use tripmate_domain::ports::message::MessageRepository;
use tripmate_domain::ports::participants::ParticipantDirectory;
use tripmate_domain::presence::PresenceRegistry;
use tripmate_infra::config::{AppConfig, DataBackend};
use tripmate_infra::db::{self, DbConfig, MemoryProbe, SurrealProbe};
use tripmate_infra::repositories::{
    InMemoryBookingLedger, InMemoryChatRepository, InMemoryMessageRepository,
    InMemoryParticipantDirectory, SurrealBookingLedger, SurrealChatRepository,
    SurrealMessageRepository, SurrealParticipantDirectory,
};
use tripmate_infra::seed::MemorySeed;

use crate::realtime::ChatGateway;

/// The stores a running instance reads and writes.
pub struct Stores {
    pub chats: Arc<dyn ChatRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub directory: Arc<dyn ParticipantDirectory>,
    pub bookings: Arc<dyn BookingLedger>,
    pub probe: Arc<dyn StoreProbe>,
}

impl Stores {
    pub fn in_memory(
        directory: Arc<InMemoryParticipantDirectory>,
        bookings: Arc<InMemoryBookingLedger>,
    ) -> Self {
        Self {
            chats: Arc::new(InMemoryChatRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            directory,
            bookings,
            probe: Arc::new(MemoryProbe),
        }
    }

    /// Memory stores filled from `memory_seed_path`. Without a seed no chat
    /// can ever be opened, so only tests may run unseeded.
    async fn seeded_memory(config: &AppConfig) -> anyhow::Result<Self> {
        let directory = Arc::new(InMemoryParticipantDirectory::new());
        let bookings = Arc::new(InMemoryBookingLedger::new());
        match config.memory_seed_path.as_deref() {
            Some(path) => {
                MemorySeed::load(path)?
                    .apply(&directory, &bookings)
                    .await
            }
            None if config.is_test() => {}
            None => anyhow::bail!(
                "data_backend=memory requires memory_seed_path outside the test environment"
            ),
        }
        Ok(Self::in_memory(directory, bookings))
    }

    async fn surreal(config: &AppConfig) -> anyhow::Result<Self> {
        let db_config = DbConfig::from_app_config(config);
        let client = db::connect(&db_config).await?;
        db::ensure_schema(&client).await?;
        Ok(Self {
            chats: Arc::new(SurrealChatRepository::with_client(client.clone())),
            messages: Arc::new(SurrealMessageRepository::with_client(client.clone())),
            directory: Arc::new(SurrealParticipantDirectory::with_client(client.clone())),
            bookings: Arc::new(SurrealBookingLedger::with_client(client)),
            probe: Arc::new(SurrealProbe::new(db_config)),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub chat: ChatService,
    pub presence: Arc<PresenceRegistry>,
    pub gateway: Arc<ChatGateway>,
    pub store_probe: Arc<dyn StoreProbe>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let stores = match config.backend()? {
            DataBackend::Memory => {
                tracing::warn!("using in-memory chat store; data is lost on restart");
                Stores::seeded_memory(&config).await?
            }
            DataBackend::Surreal => Stores::surreal(&config).await?,
        };
        Ok(Self::with_stores(config, stores))
    }

    pub fn with_stores(config: AppConfig, stores: Stores) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let chat = ChatService::new(
            stores.chats,
            stores.messages,
            stores.directory,
            stores.bookings,
            presence.clone(),
        );
        let gateway = Arc::new(ChatGateway::new(
            chat.clone(),
            Duration::from_millis(config.gateway_ack_timeout_ms),
        ));
        Self {
            config,
            chat,
            presence,
            gateway,
            store_probe: stores.probe,
        }
    }
}
