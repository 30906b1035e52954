use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct PublisherConfig {
    /// Base connection string; each table connects to `<connection><table>/`.
    pub connection: String,
    pub queue_capacity: usize,
}

impl PublisherConfig {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("connection", "ws://127.0.0.1:8765/")?
            .set_default("queue_capacity", 1024)?;

        if let Some(path) = config_path {
            if path.extension().and_then(|ext| ext.to_str()) == Some("env") {
                // Loaded into the process environment so the BEFH_ source sees it.
                match dotenvy::from_path(&path) {
                    Ok(_) => tracing::info!("loaded environment from {}", path.display()),
                    Err(err) => {
                        tracing::warn!("failed to load .env from {}: {}", path.display(), err)
                    }
                }
            } else {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(Environment::with_prefix("BEFH").try_parsing(true));

        let mut cfg: Self = builder.build()?.try_deserialize()?;
        cfg.queue_capacity = cfg.queue_capacity.max(1);
        Ok(cfg)
    }
}
