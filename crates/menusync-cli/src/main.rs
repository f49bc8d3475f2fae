//! menusync - browse restaurants, menus and orders from the terminal.
//!
//! Runs the same sync layer an app would: startup preload, cooldown-gated
//! refreshes and background restaurant enrichment for order lists.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use menusync_core::preload::PreloadOutcome;
use menusync_core::utils::{format_price, truncate_string};
use menusync_core::{
    Config, Favorites, FileBlobStore, HttpTransport, MenuSync, Resource, Session, Transport,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// When set, logs are also written to a daily-rolling file in this directory.
const LOG_DIR_ENV: &str = "MENUSYNC_LOG_DIR";

const LOG_FILE_PREFIX: &str = "menusync.log";

/// Column width for names in list output.
const NAME_WIDTH: usize = 28;

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG to control the level (e.g. RUST_LOG=menusync_core=debug).
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[derive(Debug, Parser)]
#[command(name = "menusync")]
#[command(about = "Browse restaurants, menus and orders through the menusync cache", long_about = None)]
struct Cli {
    /// Print fetched resources as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Command {
    /// Run the startup preload and report what loaded (default)
    Preload,
    /// List restaurants
    Restaurants,
    /// List a restaurant's menu
    Menu {
        /// Restaurant id
        restaurant: String,
    },
    /// List your orders
    Orders,
    /// Toggle a product as favourite
    Favorite {
        /// Product id
        product: String,
    },
    /// List favourite product ids
    Favorites,
}

impl Cli {
    fn selected(&self) -> Command {
        self.command.clone().unwrap_or(Command::Preload)
    }
}

fn print_json(resource: &Resource) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(resource)?);
    Ok(())
}

async fn run_preload(sync: &MenuSync) {
    let report = sync.startup().await;
    for entry in &report.entries {
        let status = match &entry.outcome {
            PreloadOutcome::Loaded(resource) => format!("loaded {} record(s)", resource.len()),
            PreloadOutcome::Failed(err) => format!("failed: {}", err),
            PreloadOutcome::Incomplete => "still loading in background".to_string(),
        };
        println!("{:<12} {}", entry.label, status);
    }
    if report.timed_out {
        println!("(preload timed out after {:.1}s)", report.elapsed.as_secs_f64());
    }
}

async fn run_restaurants(sync: &MenuSync, json: bool) -> Result<()> {
    let restaurants = sync.restaurants().await?;
    if json {
        return print_json(&Resource::Restaurants(restaurants));
    }
    for r in &restaurants {
        println!(
            "{:<10} {:<width$} {:<14} {:>10} {:>5}",
            r.id,
            truncate_string(&r.name, NAME_WIDTH),
            truncate_string(&r.cuisine, 14),
            r.eta_display(),
            r.rating_display(),
            width = NAME_WIDTH
        );
    }
    Ok(())
}

async fn run_menu(sync: &MenuSync, favorites: &Favorites, restaurant_id: &str, json: bool) -> Result<()> {
    let products = sync.products(restaurant_id).await?;
    if json {
        return print_json(&Resource::Products(products));
    }
    for p in &products {
        let star = if favorites.contains(&p.id) { "*" } else { " " };
        let veg = if p.is_veg { "veg" } else { "" };
        println!(
            "{} {:<10} {:<width$} {:>9} {:<3}{}",
            star,
            p.id,
            truncate_string(&p.name, NAME_WIDTH),
            format_price(p.price),
            veg,
            if p.is_available { "" } else { " (unavailable)" },
            width = NAME_WIDTH
        );
    }
    Ok(())
}

async fn run_orders(sync: &MenuSync, json: bool) -> Result<()> {
    // Seeds per-restaurant cache slots so order views resolve without
    // individual fetches.
    if let Err(e) = sync.restaurants().await {
        warn!(error = %e, "Could not load restaurants for order view");
    }
    let orders = sync.orders().await?;
    if json {
        return print_json(&Resource::Orders(orders));
    }
    for view in sync.order_views(orders) {
        let order = &view.order;
        println!(
            "{:<10} {:<18} {:<width$} {:<16} {:>9}  {} item(s)",
            order.id,
            order.created_display(),
            truncate_string(&view.restaurant_name, NAME_WIDTH),
            order.status.display_name(),
            order.total_display(),
            order.item_count(),
            width = NAME_WIDTH
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let cli = Cli::parse();

    let config = Config::load()
        .context("Failed to load configuration")?
        .with_env_overrides();
    info!(api = %config.api_base_url, "menusync starting");

    let mut session = Session::new(Config::config_dir()?);
    if let Err(e) = session.load() {
        warn!(error = %e, "Ignoring unreadable session");
    }

    let http = HttpTransport::new(config.request_timeout())?;
    let transport: Arc<dyn Transport> = match session.token() {
        Some(token) => Arc::new(http.with_token(token)),
        None => Arc::new(http),
    };
    let blobs = FileBlobStore::new(config.cache_dir()?.join("blobs"))?;
    let favorites = Favorites::load(Arc::new(blobs))?;
    let sync = MenuSync::new(config, transport, Arc::new(session));

    match cli.selected() {
        Command::Preload => run_preload(&sync).await,
        Command::Restaurants => run_restaurants(&sync, cli.json).await?,
        Command::Menu { restaurant } => run_menu(&sync, &favorites, &restaurant, cli.json).await?,
        Command::Orders => run_orders(&sync, cli.json).await?,
        Command::Favorite { product } => {
            let now = favorites.toggle(&product)?;
            println!(
                "{} {}",
                product,
                if now { "added to favourites" } else { "removed from favourites" }
            );
        }
        Command::Favorites => {
            for id in favorites.ids() {
                println!("{}", id);
            }
        }
    }

    let events = sync.data_quality_events();
    if !events.is_empty() {
        info!(count = events.len(), "Repaired upstream data");
    }
    Ok(())
}
