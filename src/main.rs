use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use panegrid::app::{run_tui, Launch};
use panegrid::models::{check_capacity, compute_grid, SplitOrientation};
use panegrid::{config, logging, persistence};

#[derive(Parser)]
#[command(name = "panegrid")]
#[command(version)]
#[command(about = "Grid of interactive shell panes with resumable workspace tabs")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    open: OpenArgs,

    /// Log file (defaults to the data directory)
    #[arg(long, env = "PANEGRID_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
struct OpenArgs {
    /// Project directory to open
    path: Option<PathBuf>,

    /// Number of panes to start with
    #[arg(short, long)]
    panes: Option<usize>,

    /// Pin a layout from the catalog, e.g. 2x3
    #[arg(short, long)]
    layout: Option<String>,

    /// Workspace name shown on the tab
    #[arg(short, long)]
    name: Option<String>,

    /// Command typed into every pane once its shell is up
    #[arg(short, long)]
    command: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a project directory in the grid
    Open(OpenArgs),
    /// Reopen the last saved workspace
    Resume,
    /// List recently opened projects
    Recent,
    /// Print the grid computed for a pane count
    Layout {
        panes: usize,
        /// Prefer side-by-side panes
        #[arg(long)]
        vertical: bool,
    },
}

fn resolve_path(path: PathBuf) -> Result<PathBuf> {
    let abs_path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()?.join(path)
    };
    if !abs_path.is_dir() {
        bail!("{} is not a directory", abs_path.display());
    }
    Ok(abs_path)
}

fn launch_for(args: OpenArgs) -> Result<Launch> {
    let Some(path) = args.path else {
        return Ok(Launch::Empty);
    };
    Ok(Launch::Open {
        path: resolve_path(path)?,
        name: args.name,
        panes: args.panes,
        layout: args.layout,
        command: args.command,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Recent) => {
            let store = persistence::JsonFileStore::open_default()?;
            let recent = persistence::load_recent(&store);
            if recent.is_empty() {
                println!("No recent projects");
            }
            for project in recent {
                println!(
                    "{:<24} {}  {}",
                    project.name,
                    project.display_path(),
                    project.opened_at.format("%Y-%m-%d %H:%M")
                );
            }
            return Ok(());
        }
        Some(Commands::Layout { panes, vertical }) => {
            check_capacity(panes)?;
            let preferred = if vertical {
                SplitOrientation::Vertical
            } else {
                SplitOrientation::Horizontal
            };
            let grid = compute_grid(panes, preferred);
            println!("{}x{}", grid.rows, grid.cols);
            return Ok(());
        }
        _ => {}
    }

    let log_path = cli.log_file.unwrap_or_else(logging::default_log_path);
    logging::init(&log_path).context("failed to set up logging")?;

    let launch = match cli.command {
        Some(Commands::Open(args)) => launch_for(args)?,
        Some(Commands::Resume) => Launch::Resume,
        _ => launch_for(cli.open)?,
    };

    let app_config = config::load_config();
    let keys = config::load_keybindings();
    tracing::info!(?launch, "starting panegrid");

    run_tui(app_config, keys, launch).await
}
