
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::Result;
use crate::database::{Bot, NewBot, namespace_for_bot};

const BOT_COLUMNS: &str = "id, name, user_id, file_path, file_url, page_count, file_size, \
     first_page_text, namespace, parsed_at, metadata, created_at";

pub struct BotQueries;

impl BotQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_bot: NewBot) -> Result<Bot> {
        let id = Uuid::new_v4().to_string();
        let namespace = namespace_for_bot(&id);
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO bots (id, name, user_id, file_path, file_url, page_count, file_size,
                              first_page_text, namespace, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new_bot.name)
        .bind(&new_bot.user_id)
        .bind(&new_bot.file_path)
        .bind(&new_bot.file_url)
        .bind(new_bot.page_count)
        .bind(new_bot.file_size)
        .bind(&new_bot.first_page_text)
        .bind(&namespace)
        .bind(&new_bot.metadata)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create bot")?;

        debug!("Created bot {} with namespace {}", id, namespace);

        Self::get_by_id(pool, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created bot").into())
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Bot>> {
        let bot = sqlx::query_as::<_, Bot>(&format!("SELECT {BOT_COLUMNS} FROM bots WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get bot by id")?;

        Ok(bot)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Bot>> {
        let bots = sqlx::query_as::<_, Bot>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots ORDER BY created_at DESC"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list bots")?;

        Ok(bots)
    }

    #[inline]
    pub async fn list_by_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Bot>> {
        let bots = sqlx::query_as::<_, Bot>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE user_id = ? ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list bots for user")?;

        Ok(bots)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bots WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete bot")?;

        Ok(result.rows_affected() > 0)
    }

    /// Stamp the completion time and repair the namespace in one statement.
    #[inline]
    pub async fn mark_processed(
        pool: &SqlitePool,
        id: &str,
        namespace: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE bots SET parsed_at = ?, namespace = ? WHERE id = ?")
            .bind(at)
            .bind(namespace)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to mark bot as processed")?;

        Ok(result.rows_affected() > 0)
    }
}
