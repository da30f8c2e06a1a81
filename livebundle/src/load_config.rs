/// `load_config` module: resolves CLI configuration from an optional YAML
/// file plus environment secrets.
///
/// The YAML file never carries secrets. It may set the API base URL and
/// override the transfer settings:
///
/// ```yaml
/// api:
///   base_url: https://api.livebundle.dev
/// upload:
///   concurrency: 8
///   multipart_threshold: 52428800
///   chunk_size: 10485760
///   attempts: 2
/// ```
///
/// # Environment
/// - `LIVEBUNDLE_TOKEN` (required): bearer token for the bundle API.
/// - `LIVEBUNDLE_API_URL` (optional): overrides `api.base_url`.
///
/// A `.env` file in the working directory is loaded first via `dotenvy`;
/// variables already set in the process take precedence.
///
/// # Errors
/// All failures are `anyhow::Error` with enough context to be printed as the
/// single `[ERROR]` line of the CLI.
use anyhow::{bail, Context, Result};
use livebundle_core::config::UploadOptions;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const DEFAULT_API_URL: &str = "https://api.livebundle.dev";
pub const TOKEN_ENV: &str = "LIVEBUNDLE_TOKEN";
pub const API_URL_ENV: &str = "LIVEBUNDLE_API_URL";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiSection {
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    api: ApiSection,
    #[serde(default)]
    upload: UploadOptions,
}

/// Fully resolved configuration for one CLI invocation.
#[derive(Clone)]
pub struct CliConfig {
    pub base_url: String,
    pub token: String,
    pub upload: UploadOptions,
}

impl std::fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("upload", &self.upload)
            .finish()
    }
}

/// Loads the optional YAML config file and injects secrets from the environment.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    dotenvy::dotenv().ok();

    let file_config = match path {
        Some(path_ref) => read_config_file(path_ref)?,
        None => {
            info!("No config file given, using defaults");
            FileConfig::default()
        }
    };

    let token = match env::var(TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
        _ => {
            error!(env = TOKEN_ENV, "API token missing in environment");
            bail!("{TOKEN_ENV} is not set; export an API token before uploading");
        }
    };

    let base_url = env::var(API_URL_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty())
        .or(file_config.api.base_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let base_url = base_url.trim().trim_end_matches('/').to_string();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        bail!("API base URL must start with http:// or https://, got {base_url:?}");
    }

    let upload = file_config.upload.normalized();
    upload.trace_loaded();
    info!(base_url = %base_url, "Configuration resolved");

    Ok(CliConfig {
        base_url,
        token,
        upload,
    })
}

fn read_config_file(path_ref: &Path) -> Result<FileConfig> {
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        e
    })
    .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;

    // An empty file is a valid, all-defaults config.
    if config_content.trim().is_empty() {
        return Ok(FileConfig::default());
    }

    let parsed: FileConfig = serde_yaml::from_str(&config_content)
        .map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            e
        })
        .with_context(|| format!("Failed to parse config YAML {}", path_ref.display()))?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");
    Ok(parsed)
}
