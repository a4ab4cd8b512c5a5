use anyhow::{Context, Result, anyhow, bail};
use console::style;
use std::net::SocketAddr;
use std::path::Path;
use tracing::{info, warn};

use crate::database::{Bot, NewBot};
use crate::pipeline::{IngestionSummary, QueryRequest, ServiceError};
use crate::server;
use crate::services::Services;

/// Keep the headline and the upstream detail when leaving the service layer.
fn service_failure(error: ServiceError) -> anyhow::Error {
    match error.details() {
        Some(details) => anyhow!("{}: {}", error, details),
        None => anyhow!("{}", error),
    }
}

/// Start the HTTP server
#[inline]
pub async fn serve(services: &Services, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| services.config.server.host.clone());
    let port = port.unwrap_or(services.config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    server::serve(services.app_state(), addr).await
}

/// Ingest a stored document into a bot's namespace
#[inline]
pub async fn ingest_document(services: &Services, file_path: &str, bot_id: &str) -> Result<()> {
    let summary = services
        .ingestion
        .ingest(file_path, bot_id)
        .await
        .map_err(service_failure)?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &IngestionSummary) {
    println!(
        "{} {} chunks stored in {}",
        style("✓").green(),
        summary.chunks,
        style(&summary.namespace).cyan()
    );
    println!("  Embedding model: {}", summary.embedding_model);
}

/// Run a similarity search against one bot
#[inline]
pub async fn query_bot(
    services: &Services,
    bot_id: &str,
    query: &str,
    top_k: Option<usize>,
    score_threshold: Option<f64>,
    json: bool,
) -> Result<()> {
    let response = services
        .query
        .retrieve(QueryRequest {
            query: query.to_string(),
            bot_id: bot_id.to_string(),
            top_k: top_k.map(|k| k as f64),
            score_threshold,
        })
        .await
        .map_err(service_failure)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!(
        "{} of {} results from {}",
        response.results_count,
        response.total_available,
        style(&response.namespace).cyan()
    );
    if let Some(average) = response.average_score {
        println!("Average score: {:.3}", average);
    }
    println!();

    for (rank, hit) in response.results.iter().enumerate() {
        let score = hit
            .score
            .map_or_else(|| "n/a".to_string(), |s| format!("{:.3}", s));
        println!(
            "{}. [{} {}] {}",
            rank + 1,
            score,
            style(hit.confidence).yellow(),
            hit.text
        );
    }

    Ok(())
}

/// Register a bot over a PDF and optionally ingest it right away.
///
/// With local storage `file` is a path on disk that gets copied into the
/// storage root. Otherwise `file` is the key of an object already uploaded
/// to the bucket.
#[inline]
pub async fn add_bot(
    services: &Services,
    file: &str,
    name: Option<String>,
    user_id: Option<String>,
    process: bool,
) -> Result<Bot> {
    let (key, bytes) = match &services.local_storage {
        Some(storage) => {
            let path = Path::new(file);
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
            let key = format!("{}/{}", user_id.as_deref().unwrap_or("local"), file_name);

            storage.store(&key, &bytes).await?;
            (key, bytes)
        }
        None => (file.to_string(), services.source.fetch(file).await?),
    };

    let file_size = bytes.len();
    let document = services
        .extractor
        .extract(bytes)
        .await
        .context("Failed to read the document")?;
    if document.is_blank() {
        bail!("No text content found in PDF");
    }

    let name = name.unwrap_or_else(|| {
        Path::new(&key)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled bot")
            .to_string()
    });

    let bot = services
        .bots
        .create_bot(NewBot {
            name,
            user_id,
            file_path: key,
            file_url: None,
            page_count: i64::try_from(document.page_count).ok(),
            file_size: i64::try_from(file_size).ok(),
            first_page_text: document.first_page_text,
            metadata: None,
        })
        .await
        .context("Failed to create bot")?;

    println!(
        "Created bot: {} (ID: {})",
        style(&bot.name).bold(),
        style(&bot.id).cyan()
    );
    println!("  Document: {} ({} pages)", bot.file_path, document.page_count);

    if process {
        info!("Processing document for bot {}", bot.id);
        ingest_document(services, &bot.file_path, &bot.id).await?;
    } else {
        println!(
            "Run 'stembot ingest {} {}' to make it searchable.",
            bot.file_path, bot.id
        );
    }

    Ok(bot)
}

/// List registered bots, optionally for one user
#[inline]
pub async fn list_bots(services: &Services, user_id: Option<&str>) -> Result<()> {
    let bots = services
        .bots
        .list_bots(user_id)
        .await
        .context("Failed to list bots")?;

    if bots.is_empty() {
        println!("No bots have been created yet.");
        println!("Use 'stembot bot add <file.pdf>' to create one.");
        return Ok(());
    }

    println!("Bots ({} total):", bots.len());
    println!();

    for bot in &bots {
        println!("{} (ID: {})", style(&bot.name).bold(), bot.id);
        println!("   Document: {}", bot.file_path);
        print_status(bot);
        println!();
    }

    Ok(())
}

fn print_status(bot: &Bot) {
    match bot.parsed_at {
        Some(at) => println!(
            "   Status: {} ({}, processed {})",
            style("searchable").green(),
            bot.derived_namespace(),
            at.format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("   Status: {}", style("not processed").yellow()),
    }
}

/// Show one bot in detail
#[inline]
pub async fn show_bot(services: &Services, bot_id: &str) -> Result<()> {
    let bot = services
        .bots
        .get_bot(bot_id)
        .await?
        .ok_or_else(|| anyhow!("Bot not found: {}", bot_id))?;

    println!("{} (ID: {})", style(&bot.name).bold().cyan(), bot.id);
    if let Some(user) = &bot.user_id {
        println!("   Owner: {}", user);
    }
    println!("   Document: {}", bot.file_path);
    if let Some(pages) = bot.page_count {
        println!("   Pages: {}", pages);
    }
    if let Some(size) = bot.file_size {
        println!("   Size: {} bytes", size);
    }
    print_status(&bot);
    println!("   Created: {}", bot.created_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(text) = &bot.first_page_text {
        let excerpt: String = text.chars().take(200).collect();
        println!();
        println!("{}", style(excerpt).dim());
    }

    Ok(())
}

/// Delete a bot and its namespace
#[inline]
pub async fn delete_bot(services: &Services, bot_id: &str) -> Result<()> {
    let bot = services
        .bots
        .get_bot(bot_id)
        .await?
        .ok_or_else(|| anyhow!("Bot not found: {}", bot_id))?;

    let namespace = bot.derived_namespace();
    if let Err(e) = services.vectors.delete_namespace(&namespace).await {
        warn!("Failed to delete namespace {}: {}", namespace, e);
        println!(
            "{} vectors in {} could not be deleted: {}",
            style("⚠").yellow(),
            namespace,
            e
        );
    }

    if services.bots.delete_bot(&bot.id).await? {
        println!("Deleted bot: {} (ID: {})", bot.name, bot.id);
    } else {
        println!("Bot {} was already gone", bot.id);
    }

    Ok(())
}
