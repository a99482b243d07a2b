use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Optional companion API serving quiz metadata. When unset the local
    /// `quizzes` collection is used instead.
    pub metadata_api_url: Option<String>,
    pub scoring: ScoringConfig,
    pub sweeper: SweeperConfig,
    pub mastery: MasteryConfig,
}

/// Speed window for the per-question speed factor, in seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScoringConfig {
    pub min_time_secs: i64,
    pub max_time_secs: i64,
    /// Total wrong answers at which an attempt fails.
    pub fail_threshold: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_time_secs: 0,
            max_time_secs: 90,
            fail_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SweeperConfig {
    pub interval_secs: u64,
    /// Attempts still in progress after this long are timed out.
    pub staleness_secs: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            staleness_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MasteryConfig {
    pub threshold: f64,
    /// Minimum attempts per subject before mastery is reported.
    pub min_samples: usize,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            min_samples: 1,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            // Fallback to current directory .env for backward compatibility
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", app_env)).required(false), // Allow missing config file, fallback to ENV
            )
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| {
                eprintln!("WARNING: MONGO_URI not set, using local default");
                "mongodb://localhost:27017/quiztrack".to_string()
            });

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "quiztrack".to_string());

        let metadata_api_url = settings
            .get_string("metadata_api.url")
            .ok()
            .or_else(|| env::var("METADATA_API_URL").ok());

        let defaults = ScoringConfig::default();
        let scoring = ScoringConfig {
            min_time_secs: settings
                .get_int("scoring.min_time_secs")
                .unwrap_or(defaults.min_time_secs),
            max_time_secs: settings
                .get_int("scoring.max_time_secs")
                .unwrap_or(defaults.max_time_secs),
            fail_threshold: settings
                .get_int("scoring.fail_threshold")
                .map(|v| v as u32)
                .unwrap_or(defaults.fail_threshold),
        };

        let sweep_defaults = SweeperConfig::default();
        let sweeper = SweeperConfig {
            interval_secs: settings
                .get_int("sweeper.interval_secs")
                .map(|v| v as u64)
                .unwrap_or(sweep_defaults.interval_secs),
            staleness_secs: settings
                .get_int("sweeper.staleness_secs")
                .unwrap_or(sweep_defaults.staleness_secs),
        };

        let mastery_defaults = MasteryConfig::default();
        let mastery = MasteryConfig {
            threshold: settings
                .get_float("mastery.threshold")
                .unwrap_or(mastery_defaults.threshold),
            min_samples: settings
                .get_int("mastery.min_samples")
                .map(|v| v as usize)
                .unwrap_or(mastery_defaults.min_samples),
        };

        Ok(Config {
            mongo_uri,
            mongo_database,
            metadata_api_url,
            scoring,
            sweeper,
            mastery,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn load_falls_back_to_defaults() {
        std::env::set_var("SKIP_ROOT_ENV", "1");
        std::env::remove_var("MONGO_URI");
        std::env::remove_var("METADATA_API_URL");

        let config = Config::load().expect("config should load without any files");
        assert_eq!(config.mongo_database, "quiztrack");
        assert_eq!(config.scoring.min_time_secs, 0);
        assert_eq!(config.scoring.max_time_secs, 90);
        assert_eq!(config.scoring.fail_threshold, 3);
        assert_eq!(config.sweeper.interval_secs, 300);
        assert_eq!(config.sweeper.staleness_secs, 3600);
        assert!((config.mastery.threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.mastery.min_samples, 1);

        std::env::remove_var("SKIP_ROOT_ENV");
    }

    #[test]
    #[serial]
    fn env_overrides_mongo_uri() {
        std::env::set_var("SKIP_ROOT_ENV", "1");
        std::env::set_var("MONGO_URI", "mongodb://db.internal:27017/quiztrack");

        let config = Config::load().unwrap();
        assert_eq!(config.mongo_uri, "mongodb://db.internal:27017/quiztrack");

        std::env::remove_var("MONGO_URI");
        std::env::remove_var("SKIP_ROOT_ENV");
    }
}
