//! # Site CLI (`site`)
//!
//! Content tooling, search, and the HTTP server for the blog.
//!
//! ## Usage
//!
//! ```bash
//! site --config ./config/site.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `site validate` | Check frontmatter of every content file |
//! | `site tags update` | Remap tags onto the core taxonomy (dry run unless `--write`) |
//! | `site tags check` | Print reader-facing tags with post counts |
//! | `site links rewrite` | Rewrite `/blog/<slug>` links to `/<slug>` |
//! | `site links check` | Confirm homepage post links resolve (`--base` for a live server) |
//! | `site index build` | Write the search index asset |
//! | `site index check` | Verify the built index asset |
//! | `site feed` | Write the RSS feed |
//! | `site search "<query>"` | Query the built search index |
//! | `site new "<title>"` | Scaffold a draft post |
//! | `site serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Fail CI on broken frontmatter
//! site validate --config ./config/site.toml
//!
//! # Preview, then apply, the tag remap for one post
//! site tags update --filter deep-work
//! site tags update --filter deep-work --write
//!
//! # Build the index, verify it, and query it
//! site index build
//! site index check
//! site search "deep work"
//!
//! # Check homepage links against a dev server
//! site links check --base http://localhost:4321
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use site_harness::{
    config, feed, links, new_post, search, search_index, server, tags, validate,
};

/// Site CLI: content tooling, search, and the HTTP server for the blog.
#[derive(Parser)]
#[command(
    name = "site",
    about = "Search, content tooling, and site endpoints for a static blog",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/site.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate frontmatter of every content file.
    ///
    /// Exits non-zero when any error is found. Warnings are reported but
    /// do not fail the run.
    Validate,

    /// Tag taxonomy maintenance.
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },

    /// Internal link maintenance.
    Links {
        #[command(subcommand)]
        action: LinksAction,
    },

    /// Search index maintenance.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Write the RSS feed.
    Feed {
        /// Output file. Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Query the built search index.
    Search { query: String },

    /// Scaffold a new draft post. Works without a config file.
    New {
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// Tag to add (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Start the HTTP server.
    Serve,
}

#[derive(Subcommand)]
enum TagsAction {
    /// Remap tags onto the core taxonomy.
    Update {
        /// Write changes. Without this flag only a preview is printed.
        #[arg(long)]
        write: bool,

        /// Only touch files whose path contains this substring.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Print reader-facing tags and fail when none exist.
    Check,
}

#[derive(Subcommand)]
enum LinksAction {
    /// Rewrite `[text](/blog/<slug>)` links to `[text](/<slug>)`.
    Rewrite {
        #[arg(long)]
        dry_run: bool,
    },
    /// Check that every post link on the built homepage resolves.
    Check {
        /// Fetch the homepage and links from a running server instead of
        /// reading build output.
        #[arg(long)]
        base: Option<String>,

        /// Build output directory holding the homepage.
        #[arg(long, default_value = "dist")]
        dist: PathBuf,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Write the search index asset.
    Build {
        /// Output file. Defaults to `[search].index_path`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Verify the index asset at `[search].index_path`.
    Check,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::New {
        title,
        description,
        tags,
    } = &cli.command
    {
        let cfg = config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
        new_post::run_new_post(&cfg, title, description.as_deref(), tags)?;
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = config::load_config(&cli.config)?;

    let ok = match cli.command {
        Commands::Validate => validate::run_validate(&cfg.content)?,
        Commands::Tags { action } => match action {
            TagsAction::Update { write, filter } => {
                tags::run_tags_update(&cfg.content, write, filter.as_deref())?;
                true
            }
            TagsAction::Check => tags::run_tags_check(&cfg.content)?,
        },
        Commands::Links { action } => match action {
            LinksAction::Rewrite { dry_run } => {
                links::run_links_rewrite(&cfg.content, dry_run)?;
                true
            }
            LinksAction::Check { base, dist } => {
                links::run_links_check(&cfg.site, base.as_deref(), &dist).await?
            }
        },
        Commands::Index { action } => match action {
            IndexAction::Build { output } => {
                search_index::run_index_build(&cfg, output.as_deref())?;
                true
            }
            IndexAction::Check => search_index::run_index_check(&cfg)?,
        },
        Commands::Feed { output } => {
            feed::run_feed(&cfg, output.as_deref())?;
            true
        }
        Commands::Search { query } => {
            search::run_search(&cfg, &query).await?;
            true
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
            true
        }
        Commands::New { .. } => unreachable!("handled before config loading"),
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
