use crate::config::Config;
use mongodb::bson::doc;
use mongodb::{Client as MongoClient, Database};

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Pinging MongoDB...");
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            mongo.run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|_| anyhow::anyhow!("MongoDB ping timeout after 5s"))??;
        tracing::info!("MongoDB connection established successfully");

        Ok(Self { config, mongo })
    }
}

pub mod attempt_service;
pub mod classifier;
pub mod metadata_service;
pub mod metrics_service;
pub mod scoring;
pub mod sweeper;
