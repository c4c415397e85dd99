// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::api::EmbeddingResponse;
pub use client::{ensure_files_exist, find_images, EmbedClient, DEFAULT_API_URL};

/// Command-line client for the CLIP embedding API
#[derive(Parser, Debug)]
#[command(name = "embed-client")]
#[command(version)]
#[command(about = "Send test requests to a running CLIP embedding node", long_about = None)]
pub struct Cli {
    /// Base URL of the embedding API
    #[arg(long, env = "EMBED_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Print the full JSON response
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed one or more texts
    Text {
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Embed images by URL or server-side path
    Uris {
        #[arg(required = true)]
        uris: Vec<String>,
    },

    /// Upload local image files
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Upload every .jpg/.jpeg/.png/.gif file in a directory
    UploadDir { dir: PathBuf },

    /// Check that the service is up
    Health,

    /// Show the loaded model
    Ready,
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let client = EmbedClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Text { texts } => {
            let response = client.embed_texts(texts).await?;
            print_embeddings(&response, cli.json)
        }
        Commands::Uris { uris } => {
            let response = client.embed_uris(uris).await?;
            print_embeddings(&response, cli.json)
        }
        Commands::Upload { paths } => {
            ensure_files_exist(&paths)?;
            let response = client.upload(&paths).await?;
            print_embeddings(&response, cli.json)
        }
        Commands::UploadDir { dir } => {
            let paths = find_images(&dir)?;
            if paths.is_empty() {
                println!("No images found in {}", dir.display());
                return Ok(());
            }
            println!("📁 Uploading {} images from {}", paths.len(), dir.display());
            let response = client.upload(&paths).await?;
            print_embeddings(&response, cli.json)
        }
        Commands::Health => {
            let health = client.health().await?;
            print_value(&health, cli.json, || format!("✅ Service status: {}", health.status))
        }
        Commands::Ready => {
            let ready = client.ready().await?;
            print_value(&ready, cli.json, || {
                format!(
                    "✅ {} ({}) ready, {}D embeddings",
                    ready.model, ready.checkpoint, ready.dimension
                )
            })
        }
    }
}

fn print_embeddings(response: &EmbeddingResponse, json: bool) -> Result<()> {
    print_value(response, json, || summarize(response))
}

fn print_value<T: Serialize>(value: &T, json: bool, summary: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", summary());
    }
    Ok(())
}

/// One-line description of an embedding response
pub fn summarize(response: &EmbeddingResponse) -> String {
    match response.embeddings.first() {
        Some(first) => format!(
            "✅ Received {} embeddings of dimension {}",
            response.embeddings.len(),
            first.len()
        ),
        None => "✅ Received 0 embeddings".to_string(),
    }
}
