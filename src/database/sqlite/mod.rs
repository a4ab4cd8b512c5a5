use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::Result;
use crate::database::{Bot, BotStore, NewBot};


pub mod queries;

pub use queries::BotQueries;

pub type DbPool = Pool<Sqlite>;

/// Local bot registry backed by SQLite.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Open `bots.db` inside `config_dir`, creating the directory if needed.
    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("bots.db")).await
    }
}

#[async_trait]
impl BotStore for Database {
    async fn get_bot(&self, id: &str) -> Result<Option<Bot>> {
        BotQueries::get_by_id(&self.pool, id).await
    }

    async fn create_bot(&self, bot: NewBot) -> Result<Bot> {
        BotQueries::create(&self.pool, bot).await
    }

    async fn list_bots(&self, user_id: Option<&str>) -> Result<Vec<Bot>> {
        match user_id {
            Some(user_id) => BotQueries::list_by_user(&self.pool, user_id).await,
            None => BotQueries::list_all(&self.pool).await,
        }
    }

    async fn delete_bot(&self, id: &str) -> Result<bool> {
        BotQueries::delete(&self.pool, id).await
    }

    async fn mark_processed(&self, id: &str, namespace: &str, at: DateTime<Utc>) -> Result<bool> {
        BotQueries::mark_processed(&self.pool, id, namespace, at).await
    }
}
