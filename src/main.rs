use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gist_tree::config::{AppConfig, TreeConfig};
use gist_tree::error::{Result, SyncError};
use gist_tree::remote::MemoryRemote;
use gist_tree::render;
use gist_tree::store::{JsonFileStorage, MemoryStorage, SortDirection, SortType, StorageBackend};
use gist_tree::{Commands, Store, TreeSynchronizer};

/// Print a gist tree from a remote snapshot.
#[derive(Parser, Debug)]
#[command(name = "gt", version, about)]
struct Cli {
    /// Config file (merged over the default locations)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON snapshot of the remote account
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Sort gists by name, creation or update time
    #[arg(long, value_enum)]
    sort: Option<SortArg>,

    /// Sort descending
    #[arg(long)]
    descending: bool,

    /// Expand every node instead of listing the roots only
    #[arg(long)]
    expand_all: bool,

    /// Show child counts on the root groups
    #[arg(long)]
    counts: bool,

    /// Keep settings in memory instead of the state file
    #[arg(long)]
    ephemeral: bool,

    /// Follow a user before printing (repeatable)
    #[arg(long = "follow", value_name = "LOGIN")]
    follow: Vec<String>,

    /// Open a gist before printing (repeatable)
    #[arg(long = "open", value_name = "ID")]
    open: Vec<String>,

    /// ASCII indicators instead of symbols
    #[arg(long)]
    ascii: bool,
}

const EXPAND_ALL_DEPTH: usize = 8;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Name,
    #[value(alias = "creationTime")]
    Created,
    #[value(alias = "updateTime")]
    Updated,
}

impl From<SortArg> for SortType {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortType::Name,
            SortArg::Created => SortType::CreationTime,
            SortArg::Updated => SortType::UpdateTime,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = AppConfig {
        tree: TreeConfig {
            show_decoration_counts: cli.counts.then_some(true),
            ..Default::default()
        },
        ..Default::default()
    };
    let config = AppConfig::load(cli.config.as_deref(), Some(&overrides));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let remote = match &cli.fixture {
        Some(path) => MemoryRemote::load(path)?,
        None => MemoryRemote::new("anonymous"),
    };

    if cli.ephemeral {
        run(&cli, &config, remote, Store::new(MemoryStorage::new())).await
    } else {
        let path = config.storage_path().ok_or_else(|| {
            SyncError::configuration("no data directory; set [storage] path or use --ephemeral")
        })?;
        tracing::debug!("state file {}", path.display());
        let backend = JsonFileStorage::open(&path)?;
        run(&cli, &config, remote, Store::new(backend)).await
    }
}

async fn run<B: StorageBackend + 'static>(
    cli: &Cli,
    config: &AppConfig,
    remote: MemoryRemote,
    store: Store<B>,
) -> Result<()> {
    let sync = Arc::new(TreeSynchronizer::new(
        Arc::new(remote),
        Arc::new(store),
        config.tree_options(),
    ));
    let commands = Commands::new(sync.clone());

    for login in &cli.follow {
        commands.follow_user(login)?;
    }
    for id in &cli.open {
        commands.open_gist(id)?;
    }
    if cli.sort.is_some() || cli.descending {
        let sort_type = cli.sort.map(SortType::from).unwrap_or_default();
        let direction = if cli.descending {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        commands.sort(sort_type, direction)?;
    }

    let depth = if cli.expand_all { EXPAND_ALL_DEPTH } else { 0 };
    let items = render::flatten(&*sync, depth).await?;
    for line in render::render_lines(&items, !cli.ascii) {
        println!("{}", line);
    }
    Ok(())
}
