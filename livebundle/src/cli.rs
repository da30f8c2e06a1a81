///
/// This module implements the CLI interface for livebundle: command parsing,
/// argument validation and the async entrypoint used by `main` and by
/// integration tests.
///
/// All packaging, signing and upload logic lives in the [`livebundle-core`]
/// crate. This module only maps flags onto a [`PublishConfig`], wires up the
/// HTTP client and reports the outcome.
///
/// ## How To Use
/// - Command line: `livebundle upload --app-id <id> --path <dir|zip>`, see `--help`.
/// - Programmatic: build a [`Cli`] and call [`run`].
///
/// [`livebundle-core`]: ../../livebundle-core/
use crate::client::ApiClient;
use crate::load_config::load_config;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use livebundle_core::config::UploadOptions;
use livebundle_core::contract::NewBundle;
use livebundle_core::package::ArtifactType;
use livebundle_core::publish::{publish, PublishConfig, PublishReport};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// CLI for livebundle: package, sign and upload live update bundles.
#[derive(Parser, Debug)]
#[clap(
    name = "livebundle",
    version,
    about = "Package, sign and upload web-asset bundles for live updates"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Package a directory (or an existing .zip) and upload it as a new bundle
    Upload(UploadArgs),
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// App that owns the bundle
    #[clap(long)]
    pub app_id: String,

    /// Web-asset directory, or a .zip archive in zip mode
    #[clap(long)]
    pub path: PathBuf,

    /// `zip` uploads one archive, `manifest` uploads every file individually
    #[clap(long, default_value = "zip", value_parser = parse_artifact_type)]
    pub artifact_type: ArtifactType,

    /// Inline PEM text or a path to a .pem file; enables signatures
    #[clap(long)]
    pub private_key: Option<String>,

    /// Share of devices that receive the bundle
    #[clap(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub rollout_percentage: Option<u8>,

    /// Channel to publish the bundle to
    #[clap(long)]
    pub channel: Option<String>,

    /// Expire the bundle this many days from now
    #[clap(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub expires_in_days: Option<u32>,

    /// Minimum Android version code
    #[clap(long)]
    pub android_min: Option<String>,

    /// Maximum Android version code
    #[clap(long)]
    pub android_max: Option<String>,

    /// Minimum iOS version code
    #[clap(long)]
    pub ios_min: Option<String>,

    /// Maximum iOS version code
    #[clap(long)]
    pub ios_max: Option<String>,

    /// Extra metadata as key=value; may be repeated
    #[clap(long = "custom-property", value_parser = parse_key_value)]
    pub custom_properties: Vec<(String, String)>,

    #[clap(long)]
    pub commit_ref: Option<String>,

    #[clap(long)]
    pub commit_sha: Option<String>,

    #[clap(long)]
    pub commit_message: Option<String>,

    /// Optional YAML config file (api and upload sections)
    #[clap(long)]
    pub config: Option<PathBuf>,
}

fn parse_artifact_type(raw: &str) -> Result<ArtifactType, String> {
    match raw.to_ascii_lowercase().as_str() {
        "zip" => Ok(ArtifactType::Zip),
        "manifest" => Ok(ArtifactType::Manifest),
        other => Err(format!("expected `zip` or `manifest`, got `{other}`")),
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

impl UploadArgs {
    /// Map flags onto the core publish request. `now` anchors `--expires-in-days`.
    pub fn to_publish_config(&self, upload: UploadOptions, now: DateTime<Utc>) -> PublishConfig {
        let custom_properties: BTreeMap<String, String> =
            self.custom_properties.iter().cloned().collect();
        let bundle = NewBundle {
            artifact_type: self.artifact_type,
            channel_name: self.channel.clone(),
            rollout: self.rollout_percentage.map(|p| f64::from(p) / 100.0),
            expires_at: self
                .expires_in_days
                .map(|days| (now + Duration::days(i64::from(days))).to_rfc3339()),
            min_android_app_version_code: self.android_min.clone(),
            max_android_app_version_code: self.android_max.clone(),
            min_ios_app_version_code: self.ios_min.clone(),
            max_ios_app_version_code: self.ios_max.clone(),
            git_ref: self.commit_ref.clone(),
            git_commit_sha: self.commit_sha.clone(),
            git_commit_message: self.commit_message.clone(),
            custom_properties,
        };
        PublishConfig {
            path: self.path.clone(),
            private_key: self.private_key.clone(),
            upload,
            bundle,
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Upload(args) => upload(args).await,
    }
}

async fn upload(args: UploadArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    tracing::info!(
        command = "upload",
        app_id = %args.app_id,
        artifact_type = %args.artifact_type,
        "Starting bundle upload"
    );

    let client = ApiClient::new(&config.base_url, &config.token, &args.app_id)
        .context("Failed to construct API client")?;
    let publish_config = args.to_publish_config(config.upload.clone(), Utc::now());

    match publish(&publish_config, &client).await {
        Ok(report) => {
            tracing::info!(command = "upload", bundle_id = %report.bundle_id, "Upload complete");
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "upload", error = ?e, "Upload failed");
            Err(anyhow::Error::new(e))
        }
    }
}

fn print_report(report: &PublishReport) {
    println!(
        "Bundle {} uploaded: {} file(s), {} bytes ({})",
        report.bundle_id,
        report.files.len(),
        report.total_bytes(),
        report.artifact_type
    );
    if let Some(deployment) = &report.app_deployment_id {
        println!("Deployment: {deployment}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(args: &[&str]) -> UploadArgs {
        let mut argv = vec!["livebundle", "upload"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Upload(args) => args,
        }
    }

    #[test]
    fn defaults_to_zip_without_metadata() {
        let args = parse(&["--app-id", "app", "--path", "www"]);
        assert_eq!(args.artifact_type, ArtifactType::Zip);

        let config = args.to_publish_config(UploadOptions::default(), Utc::now());
        assert_eq!(config.bundle, NewBundle::default());
        assert!(config.private_key.is_none());
    }

    #[test]
    fn maps_flags_onto_bundle_metadata() {
        let args = parse(&[
            "--app-id", "app", "--path", "www",
            "--artifact-type", "manifest",
            "--rollout-percentage", "25",
            "--channel", "beta",
            "--expires-in-days", "2",
            "--android-min", "10",
            "--ios-max", "99",
            "--custom-property", "team=web",
            "--custom-property", "ticket=a=b",
            "--commit-sha", "abc123",
        ]);
        let now = Utc.with_ymd_and_hms(2024, 1, 30, 12, 0, 0).unwrap();
        let bundle = args.to_publish_config(UploadOptions::default(), now).bundle;

        assert_eq!(bundle.artifact_type, ArtifactType::Manifest);
        assert_eq!(bundle.rollout, Some(0.25));
        assert_eq!(bundle.channel_name.as_deref(), Some("beta"));
        assert_eq!(bundle.expires_at.as_deref(), Some("2024-02-01T12:00:00+00:00"));
        assert_eq!(bundle.min_android_app_version_code.as_deref(), Some("10"));
        assert_eq!(bundle.max_ios_app_version_code.as_deref(), Some("99"));
        assert_eq!(bundle.custom_properties.get("team").map(String::as_str), Some("web"));
        assert_eq!(bundle.custom_properties.get("ticket").map(String::as_str), Some("a=b"));
        assert_eq!(bundle.git_commit_sha.as_deref(), Some("abc123"));
    }

    #[test]
    fn rejects_out_of_range_rollout() {
        let argv = ["livebundle", "upload", "--app-id", "a", "--path", "p", "--rollout-percentage", "101"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn rejects_malformed_custom_property() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=value").is_err());
        assert_eq!(parse_key_value("k=").unwrap(), ("k".to_string(), String::new()));
    }

    #[test]
    fn rejects_unknown_artifact_type() {
        assert!(parse_artifact_type("tarball").is_err());
        assert_eq!(parse_artifact_type("MANIFEST").unwrap(), ArtifactType::Manifest);
    }
}
