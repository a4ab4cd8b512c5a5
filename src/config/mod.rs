// Configuration management module
// TOML settings in the config directory, overlaid with environment secrets

pub mod settings;


use console::style;

pub use settings::{
    BotsBackend, Config, ConfigError, EmbeddingProvider, OllamaConfig, StorageBackend,
    VectorBackend, mask_secret,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}

/// Print the effective configuration with secrets masked
#[inline]
pub fn show_config(config: &Config) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(&config.redacted())?;
    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    match config.ollama_url() {
        Ok(url) => eprintln!("Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("Ollama URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!();
    println!("{}", rendered);
    Ok(())
}
