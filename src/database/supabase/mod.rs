//! Bot records in a Supabase `bots` table, through PostgREST.

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::database::{Bot, BotStore, NewBot, namespace_for_bot};
use crate::http::{HttpClient, HttpResponse};
use crate::{Result, StemError};

const TABLE: &str = "bots";
const PLACEHOLDER_NAMESPACE: &str = "temp-namespace";

#[derive(Debug, Clone)]
pub struct SupabaseBotStore {
    base_url: Url,
    service_key: String,
    client: HttpClient,
}

/// Row layout of the hosted `bots` table.
#[derive(Debug, Deserialize)]
struct BotRow {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    page_count: Option<i64>,
    #[serde(default)]
    file_size: Option<i64>,
    #[serde(default)]
    first_page_text: Option<String>,
    #[serde(default)]
    pinecone_namespace: Option<String>,
    #[serde(default)]
    parsed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
}

impl From<BotRow> for Bot {
    fn from(row: BotRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            user_id: row.user_id,
            file_path: row.file_name.unwrap_or_default(),
            file_url: row.file_url,
            page_count: row.page_count,
            file_size: row.file_size,
            first_page_text: row.first_page_text,
            namespace: row.pinecone_namespace,
            parsed_at: row.parsed_at,
            metadata: row.metadata.filter(|v| !v.is_null()).map(|v| v.to_string()),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    name: &'a str,
    user_id: Option<&'a str>,
    file_name: &'a str,
    file_url: Option<&'a str>,
    page_count: Option<i64>,
    file_size: Option<i64>,
    first_page_text: Option<&'a str>,
    pinecone_namespace: &'a str,
    metadata: Option<Value>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

impl SupabaseBotStore {
    #[inline]
    pub fn new(base_url: &str, service_key: &str, client: HttpClient) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StemError::Config(format!("Invalid Supabase URL {}: {}", base_url, e)))?;

        Ok(Self {
            base_url,
            service_key: service_key.to_string(),
            client,
        })
    }

    #[inline]
    pub fn from_config(config: &Config, client: HttpClient) -> Result<Self> {
        let url = config
            .supabase
            .url
            .as_deref()
            .ok_or_else(|| StemError::Config("SUPABASE_URL is not configured".to_string()))?;
        let key = config.supabase.service_key.as_deref().ok_or_else(|| {
            StemError::Config("SUPABASE_SERVICE_ROLE_KEY is not configured".to_string())
        })?;

        Self::new(url, key, client)
    }

    fn table_url(&self, filters: &[(&str, String)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("rest/v1/{}", TABLE))
            .map_err(|e| StemError::Config(format!("Failed to build PostgREST URL: {}", e)))?;

        url.query_pairs_mut().append_pair("select", "*");
        for (key, value) in filters {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url)
    }

    fn send(&self, what: &str, verb: &str, url: &Url, body: Option<&Value>) -> Result<HttpResponse> {
        let auth = format!("Bearer {}", self.service_key);
        let payload = body.map(Value::to_string);

        // Inserts are not idempotent, a retried POST can commit the row twice
        let single_attempt;
        let client = if verb == "POST" {
            single_attempt = self.client.clone().with_retry_attempts(1);
            &single_attempt
        } else {
            &self.client
        };

        client
            .execute(what, |agent| {
                let url = url.as_str();
                match (verb, payload.as_deref()) {
                    ("POST", Some(body)) => agent
                        .post(url)
                        .header("apikey", &self.service_key)
                        .header("Authorization", &auth)
                        .header("Content-Type", "application/json")
                        .header("Prefer", "return=representation")
                        .send(body),
                    ("PATCH", Some(body)) => agent
                        .patch(url)
                        .header("apikey", &self.service_key)
                        .header("Authorization", &auth)
                        .header("Content-Type", "application/json")
                        .header("Prefer", "return=representation")
                        .send(body),
                    ("DELETE", _) => agent
                        .delete(url)
                        .header("apikey", &self.service_key)
                        .header("Authorization", &auth)
                        .header("Prefer", "return=representation")
                        .call(),
                    _ => agent
                        .get(url)
                        .header("apikey", &self.service_key)
                        .header("Authorization", &auth)
                        .call(),
                }
            })
            .map_err(|e| StemError::Database(format!("Supabase {}: {}", what, e.upstream_message())))
    }

    fn rows(response: &HttpResponse) -> Result<Vec<Bot>> {
        let rows: Vec<BotRow> = response
            .json()
            .map_err(|e| StemError::Database(format!("Failed to parse bots response: {}", e)))?;
        Ok(rows.into_iter().map(Bot::from).collect())
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Result<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this))
            .await
            .map_err(|e| StemError::Database(format!("Supabase task failed: {}", e)))?
    }

    fn get_blocking(&self, id: &str) -> Result<Option<Bot>> {
        let url = self.table_url(&[("id", format!("eq.{}", id))])?;
        let response = self.send("get bot", "GET", &url, None)?;
        Ok(Self::rows(&response)?.into_iter().next())
    }

    fn create_blocking(&self, bot: &NewBot) -> Result<Bot> {
        let metadata = bot
            .metadata
            .as_deref()
            .map(|m| serde_json::from_str(m).unwrap_or_else(|_| Value::String(m.to_string())));
        let row = serde_json::to_value(InsertRow {
            name: &bot.name,
            user_id: bot.user_id.as_deref(),
            file_name: &bot.file_path,
            file_url: bot.file_url.as_deref(),
            page_count: bot.page_count,
            file_size: bot.file_size,
            first_page_text: bot.first_page_text.as_deref(),
            pinecone_namespace: PLACEHOLDER_NAMESPACE,
            metadata,
        })
        .map_err(|e| StemError::Database(format!("Failed to serialize bot: {}", e)))?;

        let url = self.table_url(&[])?;
        let response = self.send("create bot", "POST", &url, Some(&row))?;
        let created = Self::rows(&response)?
            .into_iter()
            .next()
            .ok_or_else(|| StemError::Database("Supabase returned no created bot".to_string()))?;

        // The id is only known after insert, so the namespace is corrected in a follow-up update
        let namespace = namespace_for_bot(&created.id);
        let url = self.table_url(&[("id", format!("eq.{}", created.id))])?;
        let response = self.send(
            "assign namespace",
            "PATCH",
            &url,
            Some(&json!({ "pinecone_namespace": namespace })),
        )?;

        debug!("Created bot {} with namespace {}", created.id, namespace);
        Self::rows(&response)?
            .into_iter()
            .next()
            .ok_or_else(|| StemError::Database("Supabase returned no updated bot".to_string()))
    }

    fn list_blocking(&self, user_id: Option<&str>) -> Result<Vec<Bot>> {
        let mut filters = vec![("order", "created_at.desc".to_string())];
        if let Some(user_id) = user_id {
            filters.push(("user_id", format!("eq.{}", user_id)));
        }
        let url = self.table_url(&filters)?;
        let response = self.send("list bots", "GET", &url, None)?;
        Self::rows(&response)
    }

    fn delete_blocking(&self, id: &str) -> Result<bool> {
        let url = self.table_url(&[("id", format!("eq.{}", id))])?;
        let response = self.send("delete bot", "DELETE", &url, None)?;
        Ok(!Self::rows(&response)?.is_empty())
    }

    fn mark_processed_blocking(&self, id: &str, namespace: &str, at: DateTime<Utc>) -> Result<bool> {
        let url = self.table_url(&[("id", format!("eq.{}", id))])?;
        let response = self.send(
            "mark processed",
            "PATCH",
            &url,
            Some(&json!({ "parsed_at": at.to_rfc3339(), "pinecone_namespace": namespace })),
        )?;
        Ok(!Self::rows(&response)?.is_empty())
    }
}

#[async_trait]
impl BotStore for SupabaseBotStore {
    async fn get_bot(&self, id: &str) -> Result<Option<Bot>> {
        let id = id.to_string();
        self.run(move |store| store.get_blocking(&id)).await
    }

    async fn create_bot(&self, bot: NewBot) -> Result<Bot> {
        let created = self.run(move |store| store.create_blocking(&bot)).await?;
        info!("Registered bot {} in Supabase", created.id);
        Ok(created)
    }

    async fn list_bots(&self, user_id: Option<&str>) -> Result<Vec<Bot>> {
        let user_id = user_id.map(str::to_string);
        self.run(move |store| store.list_blocking(user_id.as_deref()))
            .await
    }

    async fn delete_bot(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run(move |store| store.delete_blocking(&id)).await
    }

    async fn mark_processed(&self, id: &str, namespace: &str, at: DateTime<Utc>) -> Result<bool> {
        let id = id.to_string();
        let namespace = namespace.to_string();
        self.run(move |store| store.mark_processed_blocking(&id, &namespace, at))
            .await
    }
}
