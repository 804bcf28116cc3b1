//! Command-line front end for BinBuddy.
//!
//! Classifies a photo of a waste item, estimates the avoided emissions, and
//! suggests nearby places to drop it off, donate it, or dispose of it.

mod store;
mod wiring;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::fs;

use binbuddy_core::{
    BinBuddyConfig, ClassificationRequest, ClientId, RawClassification, normalize,
};

use crate::wiring::ClassifyOptions;

/// Classify waste items and find places to take them.
#[derive(Parser)]
#[command(name = "binbuddy", version)]
#[command(about = "Classify waste items and find places to take them")]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(long, env = "BINBUDDY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Classify an image and suggest disposal places.
    Classify {
        /// Image file (PNG, JPEG, GIF, or WebP).
        image: PathBuf,

        /// Latitude of the user.
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude of the user.
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Item mass in kilograms, overriding the classifier's estimate.
        #[arg(long)]
        mass: Option<f64>,

        /// Append the result to this JSON-lines file.
        #[arg(long)]
        store: Option<PathBuf>,

        /// Identity used for rate limiting.
        #[arg(long, default_value = "local")]
        client: String,

        /// Extra context passed to the classifier.
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Suggest disposal places for a search hint without classifying.
    Nearby {
        /// What to look for, e.g. "electronics recycling" or `nearest_recycling`.
        #[arg(long)]
        hint: String,

        /// Latitude of the user.
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude of the user.
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },

    /// Normalize a raw classifier answer stored in a file. Works offline.
    Normalize {
        /// File holding the classifier's JSON (code fences are fine).
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify {
            image,
            lat,
            lon,
            mass,
            store,
            client,
            prompt,
        } => {
            let bytes = fs::read(&image)
                .await
                .with_context(|| format!("reading image {}", image.display()))?;
            let mut request = ClassificationRequest::new(bytes, lat, lon);
            if let Some(mass_kg) = mass {
                request = request.with_user_mass(mass_kg);
            }

            let service = wiring::service(&config, ClassifyOptions { store, prompt })?;
            let result = service
                .handle_for_client(&ClientId(client), &request)
                .await?;
            print_json(&result)
        }
        Commands::Nearby { hint, lat, lon } => {
            let service = wiring::service(&config, ClassifyOptions::default())?;
            let places = service.nearby(lat, lon, &hint).await?;
            print_json(&places)
        }
        Commands::Normalize { input } => {
            let text = fs::read_to_string(&input)
                .await
                .with_context(|| format!("reading {}", input.display()))?;
            let raw = RawClassification::from_model_text(&text)?;
            print_json(&normalize(&raw))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<BinBuddyConfig> {
    match path {
        Some(path) => BinBuddyConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(BinBuddyConfig::default()),
    }
}

#[expect(clippy::print_stdout, reason = "the result is the program's output")]
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "binbuddy", "nearby", "--hint", "battery recycling", "--lat", "-33.86", "--lon",
            "151.2",
        ])
        .expect("valid arguments");

        assert!(
            matches!(
                cli.command,
                Commands::Nearby { ref hint, lat, .. } if hint == "battery recycling" && lat < 0.0
            ),
            "nearby with negative latitude"
        );
    }

    #[test]
    fn classify_defaults() {
        let cli = Cli::try_parse_from(["binbuddy", "classify", "item.jpg", "--lat", "40", "--lon", "-75"])
            .expect("valid arguments");

        assert!(
            matches!(
                cli.command,
                Commands::Classify { ref client, mass: None, store: None, prompt: None, .. }
                    if client == "local"
            ),
            "classify defaults"
        );
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_config(Some(Path::new("/nonexistent/binbuddy.toml")))
            .expect_err("file does not exist");
        assert!(err.to_string().contains("loading configuration"), "{err}");
    }
}
