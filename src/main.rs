use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use openglide::{AppState, BoundingBox, Coordinates, OpenglideConfig, SiteCollection, logging, web};

/// Map server for paragliding and free-flying sites from OpenStreetMap
#[derive(Debug, Parser)]
#[command(name = "openglide", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Address to bind, overrides `server.listen_address`
        #[arg(long)]
        listen: Option<String>,
    },
    /// Print the sites inside a bounding box
    Sites {
        /// south,west,north,east
        #[arg(long)]
        bbox: String,
        #[arg(long, default_value_t = 10)]
        zoom: u8,
        /// lat,lon to list the closest sites first
        #[arg(long)]
        near: Option<String>,
        /// One block per site with its tags instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// Resolve a place name or "lat, lon" pair
    Search {
        query: String,
        /// List suggestions instead of the single best match
        #[arg(long)]
        suggest: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = OpenglideConfig::load_from_path(cli.config.clone())?;
    logging::init(&config.logging, cli.verbose)?;
    tracing::debug!(?config, "Loaded configuration");

    match cli.command.unwrap_or(Command::Serve { listen: None }) {
        Command::Serve { listen } => {
            if let Some(listen) = listen {
                config.server.listen_address = listen;
                config.validate()?;
            }
            let state = AppState::from_config(&config)?;
            web::run(state, &config.server).await?;
        }
        Command::Sites {
            bbox,
            zoom,
            near,
            text,
        } => {
            let bbox = BoundingBox::parse(&bbox)?;
            let near = near.as_deref().map(Coordinates::parse).transpose()?;
            let state = AppState::from_config(&config)?;
            let mut collection = state.sites.sites_in(&bbox, zoom).await?;
            if let Some(near) = near {
                collection.sort_by_distance(&near);
            }
            if text {
                print_text(&collection);
            } else {
                print_json(&collection)?;
            }
        }
        Command::Search { query, suggest } => {
            let state = AppState::from_config(&config)?;
            if suggest {
                print_json(&state.search.suggest(&query).await?)?;
            } else {
                print_json(&state.search.resolve(&query).await?)?;
            }
        }
    }

    Ok(())
}

fn print_text(collection: &SiteCollection) {
    for site in &collection.sites {
        println!(
            "{} ({:.4}, {:.4})  {}",
            site.name, site.center.latitude, site.center.longitude, site.osm_url
        );
        for (key, value) in site.tag_info() {
            println!("    {key} = {value}");
        }
        for member in &site.members {
            println!("    - {:?}: {}", member.kind, member.name);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
