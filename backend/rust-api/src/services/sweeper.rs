use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::SweeperConfig;
use crate::metrics::{ATTEMPTS_FINALIZED_TOTAL, SWEEPER_TICKS_TOTAL};
use crate::models::attempt::{AttemptRecord, AttemptStatus};
use crate::services::attempt_service::ATTEMPTS_COLLECTION;
use crate::utils::time::chrono_to_bson;

/// Finalizes attempts left in progress past the staleness window. Stateless:
/// the scheduling loop below is the only timer, and every write re-checks
/// the status in its filter, so redundant or overlapping sweeps are no-ops.
pub struct TimeoutSweeper {
    mongo: Database,
    config: SweeperConfig,
}

impl TimeoutSweeper {
    pub fn new(mongo: Database, config: SweeperConfig) -> Self {
        Self { mongo, config }
    }

    pub async fn run(&self) {
        let interval = Duration::from_secs(self.config.interval_secs);
        info!("Starting timeout sweeper loop (interval {}s)", interval.as_secs());

        loop {
            match self.sweep_once().await {
                Ok(swept) => {
                    SWEEPER_TICKS_TOTAL.with_label_values(&["success"]).inc();
                    if swept > 0 {
                        info!(swept, "Timeout sweep finalized stale attempts");
                    }
                }
                Err(err) => {
                    SWEEPER_TICKS_TOTAL.with_label_values(&["error"]).inc();
                    warn!(error = %err, "Timeout sweep failed");
                }
            }

            sleep(interval).await;
        }
    }

    /// One sweep pass. Returns the number of attempts timed out.
    pub async fn sweep_once(&self) -> Result<u64> {
        let staleness = chrono::Duration::seconds(self.config.staleness_secs);
        let cutoff = Utc::now() - staleness;
        let collection = self.mongo.collection::<AttemptRecord>(ATTEMPTS_COLLECTION);

        let mut cursor = collection
            .find(doc! {
                "status": AttemptStatus::InProgress.as_str(),
                "start_time": { "$lt": chrono_to_bson(cutoff) },
            })
            .await
            .context("Failed to query stale attempts")?;

        let mut swept = 0u64;
        while let Some(attempt) = cursor.try_next().await? {
            let end_time = attempt.start_time + staleness;

            // Guard-then-write: the status check is part of the update filter,
            // so an attempt finalized since the find is skipped, not clobbered.
            let result = collection
                .update_one(
                    doc! {
                        "_id": &attempt.id,
                        "status": AttemptStatus::InProgress.as_str(),
                    },
                    doc! {
                        "$set": {
                            "status": AttemptStatus::TimedOut.as_str(),
                            "end_time": chrono_to_bson(end_time),
                            "duration": self.config.staleness_secs,
                            "updated_at": chrono_to_bson(Utc::now()),
                        },
                        "$inc": { "version": 1 },
                    },
                )
                .await
                .context("Failed to finalize stale attempt")?;

            if result.modified_count > 0 {
                swept += 1;
                ATTEMPTS_FINALIZED_TOTAL
                    .with_label_values(&[AttemptStatus::TimedOut.as_str()])
                    .inc();
            }
        }

        Ok(swept)
    }
}
