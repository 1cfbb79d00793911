use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::account::{AccountStore, PassphraseVault};
use crate::client::BridgeClient;
use crate::config::IntakeConfig;
use crate::error::NodeError;
use crate::pipeline::IntakeService;
use crate::rpc::RpcServer;
use crate::storage::Storage;

pub mod sweeper;

pub use sweeper::Sweeper;

pub struct IntakeNode {
    pub storage: Arc<Storage>,
    pub service: Arc<IntakeService>,
    pub config: IntakeConfig,
}

impl IntakeNode {
    /// Open the store, wire the pipeline to the provider bridge and upsert
    /// the configured country seeds.
    pub fn new(config: IntakeConfig) -> Result<Self, NodeError> {
        info!("Persistence: Opening Sled DB at '{}'...", config.node.db_path);
        let storage = Arc::new(Storage::open(&config.node.db_path)?);
        let store = Arc::new(AccountStore::new(storage.clone())?);

        let vault = Arc::new(PassphraseVault::new(&config.security.vault_secret)?);
        let client = Arc::new(BridgeClient::new(
            config.provider.bridge_url.clone(),
            Duration::from_secs(config.provider.request_timeout_secs),
        )?);
        info!("Provider bridge: {}", config.provider.bridge_url);

        let service = Arc::new(IntakeService::new(store, client, vault, &config.pipeline));
        for seed in &config.countries {
            service.upsert_country(&seed.to_policy())?;
        }

        Ok(Self {
            storage,
            service,
            config,
        })
    }

    pub async fn start(self) -> Result<(), NodeError> {
        info!("Starting intake node services...");

        let interval = self.config.pipeline.sweep_interval_secs;
        if interval > 0 {
            let sweeper = Sweeper::new(self.service.clone(), Duration::from_secs(interval));
            tokio::spawn(sweeper.start());
        } else {
            info!("In-process sweep disabled; waiting for processReadyAccounts calls");
        }

        if self.config.security.admin_token_hash.is_none() {
            warn!("⚠️  No admin_token_hash configured: admin RPC methods are disabled");
        }

        // --- Graceful Shutdown Handler ---
        let storage = self.storage.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            info!("🛑 Shutting down... flushing database");
            match storage.flush().await {
                Ok(()) => info!("✅ Database flushed successfully"),
                Err(e) => warn!("Failed to flush database: {}", e),
            }
            std::process::exit(0);
        });

        let server = RpcServer::new(
            self.service.clone(),
            self.config.security.admin_token_hash.clone(),
            self.config.node.rpc_port,
        );
        server.start().await?;
        Ok(())
    }
}
