use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::models::quiz::{QuizDocument, QuizInfo};
use crate::services::attempt_service::QUIZZES_COLLECTION;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Remote provider when a companion API is configured, local collection
/// otherwise.
pub fn provider_from_config(config: &Config, mongo: Database) -> Arc<dyn QuizMetadataProvider> {
    match &config.metadata_api_url {
        Some(url) => Arc::new(RemoteMetadataProvider::new(url.clone())),
        None => Arc::new(MongoMetadataProvider::new(mongo)),
    }
}

/// Resolves quiz ids to subject/chapter/grade. Implementations must degrade
/// to an empty map on failure; the aggregator treats missing entries as
/// "unknown" and never aborts on a metadata outage.
#[async_trait]
pub trait QuizMetadataProvider: Send + Sync {
    async fn get(&self, quiz_ids: &[String]) -> HashMap<String, QuizInfo>;
}

/// Metadata served from the local `quizzes` collection.
pub struct MongoMetadataProvider {
    mongo: Database,
}

impl MongoMetadataProvider {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    async fn lookup(&self, quiz_ids: &[String]) -> anyhow::Result<HashMap<String, QuizInfo>> {
        let mut cursor = self
            .mongo
            .collection::<QuizDocument>(QUIZZES_COLLECTION)
            .find(doc! { "_id": { "$in": quiz_ids } })
            .await?;

        let mut infos = HashMap::new();
        while let Some(quiz) = cursor.try_next().await? {
            infos.insert(quiz.id.clone(), QuizInfo::from(&quiz));
        }
        Ok(infos)
    }
}

#[async_trait]
impl QuizMetadataProvider for MongoMetadataProvider {
    async fn get(&self, quiz_ids: &[String]) -> HashMap<String, QuizInfo> {
        if quiz_ids.is_empty() {
            return HashMap::new();
        }

        match tokio::time::timeout(LOOKUP_TIMEOUT, self.lookup(quiz_ids)).await {
            Ok(Ok(infos)) => infos,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Quiz metadata lookup failed, degrading to empty map");
                HashMap::new()
            }
            Err(_) => {
                tracing::warn!("Quiz metadata lookup timed out, degrading to empty map");
                HashMap::new()
            }
        }
    }
}

/// Metadata fetched from a companion API. Expects
/// `GET {base}/quizzes/metadata?ids=a,b,c` returning `{id: QuizInfo}`.
pub struct RemoteMetadataProvider {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteMetadataProvider {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, base_url }
    }

    async fn fetch(&self, quiz_ids: &[String]) -> anyhow::Result<HashMap<String, QuizInfo>> {
        let url = format!(
            "{}/quizzes/metadata?ids={}",
            self.base_url.trim_end_matches('/'),
            quiz_ids.join(",")
        );
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl QuizMetadataProvider for RemoteMetadataProvider {
    async fn get(&self, quiz_ids: &[String]) -> HashMap<String, QuizInfo> {
        if quiz_ids.is_empty() {
            return HashMap::new();
        }

        match self.fetch(quiz_ids).await {
            Ok(infos) => infos,
            Err(e) => {
                tracing::warn!(error = %e, "Remote metadata fetch failed, degrading to empty map");
                HashMap::new()
            }
        }
    }
}
