use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use snitchr_client::controller::{ControllerConfig, ListController, ListEvent};
use snitchr_client::export::{ExportFormat, export, export_file_name, export_stats};
use snitchr_client::geocoding::{GeocodeCache, NominatimGeocoder};
use snitchr_client::{ClientConfig, ConfessionStore, HttpStore, WsFeed};
use snitchr_types::api::{FilterKind, ListQuery, NewConfession};
use snitchr_types::models::{Confession, Location, Mood, ReactionKind, Reactions};

/// Anonymous confessions from the terminal.
#[derive(Parser, Debug)]
#[command(name = "snitchr", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print one page of confessions.
    List {
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[command(flatten)]
        query: QueryArgs,
        /// Resolve locations to place names.
        #[arg(long)]
        places: bool,
    },
    /// Post a confession.
    Post {
        message: String,
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long)]
        mood: Option<Mood>,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Toggle a reaction on a confession.
    React { id: String, kind: ReactionKind },
    /// Delete a confession.
    Delete { id: String },
    /// Follow the list live until interrupted.
    Watch {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Download every matching confession to a file.
    Export {
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        /// Defaults to snitchr-confessions-<date>.<ext>.
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Print server-wide counters.
    Stats,
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long, default_value = "all")]
    filter: FilterKind,
}

impl QueryArgs {
    fn into_query(self) -> ListQuery {
        ListQuery {
            search: self.search,
            filter: self.filter,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snitchr=info,snitchr_client=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    let store = HttpStore::new(&config.api_url, config.timeout)?;

    match cli.command {
        Commands::List { page, query, places } => list(&store, &config, page, query.into_query(), places).await,
        Commands::Post {
            message,
            nickname,
            mood,
            lat,
            lon,
        } => {
            let mut draft = NewConfession::new(message);
            draft.nickname = nickname;
            draft.mood = mood;
            if let (Some(lat), Some(lon)) = (lat, lon) {
                draft.location = Some(Location::new(lat, lon));
            }
            let created = store.create(draft).await?;
            print_confession(&created);
            Ok(())
        }
        Commands::React { id, kind } => {
            let current = store.get(&id).await?;
            let reactions = current.reactions.toggled(kind)?;
            let updated = store.update_reactions(&id, reactions).await?;
            print_confession(&updated);
            Ok(())
        }
        Commands::Delete { id } => {
            store.delete(&id).await?;
            println!("deleted {id}");
            Ok(())
        }
        Commands::Watch { query } => watch(store, &config, query.into_query()).await,
        Commands::Export { format, out, query } => export_all(store, &config, format, out, query.into_query()).await,
        Commands::Stats => {
            let stats = store.stats().await?;
            println!("confessions: {}", stats.total_confessions);
            println!("today:       {}", stats.today_confessions);
            println!("reactions:   {}", stats.total_reactions);
            Ok(())
        }
    }
}

async fn list(store: &HttpStore, config: &ClientConfig, page: u32, query: ListQuery, places: bool) -> anyhow::Result<()> {
    let result = store.query(&query, page, config.page_size).await?;
    let places = if places {
        Some(GeocodeCache::new(NominatimGeocoder::new(config.timeout)?))
    } else {
        None
    };

    for confession in &result.confessions {
        print_confession(confession);
        if let (Some(cache), Some(location)) = (&places, confession.location) {
            println!("   near {}", cache.lookup(location).await.name);
        }
    }
    println!(
        "-- page {} ({} shown, {} matching)",
        page,
        result.confessions.len(),
        result.total
    );
    Ok(())
}

fn controller(store: HttpStore, config: &ClientConfig, query: ListQuery) -> Arc<ListController<HttpStore>> {
    let settings = ControllerConfig {
        page_size: config.page_size,
    };
    Arc::new(ListController::new(store, settings).with_query(query))
}

async fn watch(store: HttpStore, config: &ClientConfig, query: ListQuery) -> anyhow::Result<()> {
    let controller = controller(store, config, query);
    let mut events = controller.subscribe_events();

    controller.attach_feed(WsFeed::new(&config.feed_url).subscribe());
    controller.init().await?;
    for confession in controller.confessions() {
        print_confession(&confession);
    }
    info!("Watching {} for changes", config.feed_url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ListEvent::RealtimeMerged { kind, id }) => match controller.get(&id) {
                    Some(confession) => {
                        println!("-- {kind}");
                        print_confession(&confession);
                    }
                    None => println!("-- {kind} {id}"),
                },
                Ok(ListEvent::Refreshed { count }) => println!("-- resynced, {count} confessions listed"),
                Ok(ListEvent::Error(e)) => warn!("{}", e),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Skipped {} list events", n),
                Err(RecvError::Closed) => break,
            }
        }
    }

    controller.dispose();
    Ok(())
}

async fn export_all(
    store: HttpStore,
    config: &ClientConfig,
    format: ExportFormat,
    out: Option<PathBuf>,
    query: ListQuery,
) -> anyhow::Result<()> {
    let controller = controller(store, config, query);
    controller.init().await?;
    while controller.load_more().await? {}

    let confessions = controller.confessions();
    let now = Utc::now();
    let text = export(&confessions, format, now)?;
    let path = out.unwrap_or_else(|| PathBuf::from(export_file_name(format, now.date_naive())));
    tokio::fs::write(&path, text)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    let stats = export_stats(&confessions);
    println!(
        "wrote {} confessions to {} ({} reactions, {} with reactions, {} with location, {} with mood, {:.1} reactions each)",
        stats.total_confessions,
        path.display(),
        stats.total_reactions,
        stats.with_reactions,
        stats.with_location,
        stats.with_mood,
        stats.average_reactions
    );
    Ok(())
}

fn print_confession(c: &Confession) {
    let mood = c.mood.map(|m| format!("{} ", m.glyph())).unwrap_or_default();
    println!("{} {}{}", c.id, mood, c.message);
    println!(
        "   by {} at {}  {}",
        c.display_name(),
        c.created_at.format("%Y-%m-%d %H:%M"),
        reactions_line(&c.reactions)
    );
}

/// `❤️ 3*  😂 0  🤔 1`, starred where the current user reacted.
fn reactions_line(reactions: &Reactions) -> String {
    ReactionKind::ALL
        .into_iter()
        .map(|kind| {
            let state = reactions.get(kind);
            let mark = if state.reacted { "*" } else { "" };
            format!("{} {}{}", kind.glyph(), state.count, mark)
        })
        .collect::<Vec<_>>()
        .join("  ")
}
