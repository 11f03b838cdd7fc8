// ABOUTME: Practica API server binary
// ABOUTME: Loads environment configuration, opens the database, and serves HTTP
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Practica Server Binary
//!
//! Configuration comes from the environment (see
//! `practica_server::config::environment`); only the port and database
//! location can be overridden on the command line. The session signing
//! secret is required at boot — every other missing key degrades its own
//! subsystem and logs a warning instead.

use anyhow::Result;
use clap::Parser;
use practica_server::{
    config::{environment::DatabaseUrl, ServerConfig},
    database::Database,
    logging,
    server::{serve, ServerResources},
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "practica-server")]
#[command(about = "Practica - conversational coaching API server")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override database URL (e.g. sqlite:./data/practica.db)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(url) = args.database_url {
        config.database_url = DatabaseUrl::parse_url(&url);
    }

    info!("Starting Practica API server");
    info!("{}", config.summary());

    let database = Database::new(&config.database_url.to_connection_string())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    info!("Database ready");

    let resources = Arc::new(ServerResources::new(database, config));

    serve(resources)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    Ok(())
}
