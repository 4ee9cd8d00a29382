use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

use feedstore::config::Config;
use feedstore::storage::{Feed, FeedStore, NewFeed, StoreError};

/// Get the config directory path (~/.config/feedstore/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedstore"))
}

#[derive(Parser, Debug)]
#[command(name = "feedstore", about = "Inspect and edit a feed subscription database")]
struct Args {
    /// Config file (default: ~/.config/feedstore/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed (moves it if already subscribed)
    Add {
        feed_link: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        link: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        order: String,
        #[arg(long)]
        folder: Option<i64>,
    },
    /// List feeds
    List {
        /// Only feeds whose icon has never been stored
        #[arg(long)]
        missing_icons: bool,
    },
    /// Show one feed
    Show { id: i64 },
    /// Rename a feed
    Rename { id: i64, title: String },
    /// Move a feed into a folder, or out of any folder when omitted
    Move { id: i64, folder: Option<i64> },
    /// Change a feed's retrieval URL
    SetLink { id: i64, feed_link: String },
    /// Unsubscribe from a feed
    Delete { id: i64 },
    /// List recorded feed errors
    Errors,
    /// Forget all recorded feed errors
    ResetErrors,
    /// List folders
    Folders,
    /// Create a folder
    AddFolder { title: String },
}

fn print_feed(feed: &Feed) {
    let folder = feed
        .folder_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let icon = if feed.has_icon { "icon" } else { "no icon" };
    println!(
        "{:>5}  {:<40}  folder {:<4}  {:<7}  {}",
        feed.id, feed.title, folder, icon, feed.feed_link
    );
}

fn ensure(ok: bool, what: &str) -> Result<()> {
    if !ok {
        bail!("Failed to {}", what);
    }
    Ok(())
}

async fn run(store: &FeedStore, command: Command) -> Result<()> {
    match command {
        Command::Add {
            feed_link,
            title,
            link,
            description,
            order,
            folder,
        } => {
            let new_feed = NewFeed::new(feed_link)
                .with_title(title)
                .with_link(link)
                .with_description(description)
                .with_custom_order(order)
                .in_folder(folder);
            let feed = store
                .create_feed(&new_feed)
                .await
                .context("Failed to add feed")?;
            print_feed(&feed);
        }
        Command::List { missing_icons } => {
            let feeds = if missing_icons {
                store.list_feeds_missing_icons().await
            } else {
                store.list_feeds().await
            };
            for feed in &feeds {
                print_feed(feed);
            }
        }
        Command::Show { id } => match store.fetch_feed(id).await {
            Ok(feed) => {
                print_feed(&feed);
                println!("       link:         {}", feed.link);
                println!("       description:  {}", feed.description);
                println!("       custom order: {}", feed.custom_order);
                if let Some(icon) = &feed.icon {
                    println!("       icon:         {} bytes", icon.len());
                }
            }
            Err(StoreError::NotFound) => bail!("No feed with id {}", id),
            Err(e) => return Err(e).context("Failed to load feed"),
        },
        Command::Rename { id, title } => ensure(store.rename_feed(id, &title).await, "rename feed")?,
        Command::Move { id, folder } => {
            ensure(store.update_feed_folder(id, folder).await, "move feed")?
        }
        Command::SetLink { id, feed_link } => ensure(
            store.update_feed_link(id, &feed_link).await,
            "update feed link",
        )?,
        Command::Delete { id } => ensure(store.delete_feed(id).await, "delete feed")?,
        Command::Errors => {
            let mut errors: Vec<_> = store.get_feed_errors().await.into_iter().collect();
            errors.sort();
            for (feed_id, error) in errors {
                println!("{:>5}  {}", feed_id, error);
            }
        }
        Command::ResetErrors => store.reset_feed_errors().await,
        Command::Folders => {
            for folder in store.list_folders().await {
                println!("{:>5}  {}", folder.id, folder.title);
            }
        }
        Command::AddFolder { title } => {
            let folder = store
                .create_folder(&title)
                .await
                .context("Failed to create folder")?;
            println!("{:>5}  {}", folder.id, folder.title);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging comes up before the config is read so its warnings are seen.
    // RUST_LOG wins over the configured filter.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("warn")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if !from_env {
        filter_handle
            .reload(EnvFilter::new(&config.log_filter))
            .context("Failed to apply log_filter")?;
    }

    let db_path = match args.db {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
            config.resolve_database_path(&config_dir)
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let store = match FeedStore::open_with(db_path_str, &config.database).await {
        Ok(store) => store,
        Err(StoreError::InstanceLocked) => {
            eprintln!("Error: {}", StoreError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let result = run(&store, args.command).await;
    store.close().await;
    result
}
