//! # Persona Context CLI (`pctx`)
//!
//! The `pctx` binary drives the document library: adding and versioning
//! documents, assigning them to characters, and assembling a budgeted
//! context block for a query.
//!
//! ## Usage
//!
//! ```bash
//! pctx --config ./config/pctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pctx init` | Create the SQLite database and schema |
//! | `pctx add <paths…>` | Add files or directories |
//! | `pctx list` | List documents with usage badges |
//! | `pctx show <id>` | Document detail, versions, chunk preview |
//! | `pctx reprocess <id>` | Preprocess and chunk into a new version |
//! | `pctx upload-version <id> <path>` | New version from a replacement file |
//! | `pctx versions <id>` / `pctx chunks <version>` | Version and chunk listings |
//! | `pctx activate <id> <version>` | Switch the active version |
//! | `pctx tag <ids…>` | Edit tags and folder |
//! | `pctx assign` / `unassign` / `pin` | Character assignments |
//! | `pctx docs <character>` | A character's documents |
//! | `pctx context <character> "<query>"` | Assemble context |
//! | `pctx export` / `import` | JSON snapshots |
//! | `pctx stats` | Library overview |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use persona_context::config;
use persona_context::edit_cmd::TagArgs;
use persona_context::models::parse_tag_list;
use persona_context::progress::ProgressMode;
use persona_context::version_cmd::ReprocessArgs;
use persona_context::{
    assign_cmd, context_cmd, edit_cmd, export, get, ingest, migrate, stats, version_cmd,
};

/// Persona Context CLI: a local document library that assembles
/// budgeted reference context for chat characters.
#[derive(Parser)]
#[command(
    name = "pctx",
    about = "Persona Context: versioned reference documents and budgeted context assembly for chat characters",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pctx.toml`. Only the `[db]` section is required.
    #[arg(long, global = true, default_value = "./config/pctx.toml")]
    config: PathBuf,

    /// Enable debug logging on stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all tables. Idempotent.
    Init,

    /// Add files or directories to the library.
    ///
    /// Directories are walked recursively using `[ingest]` include and
    /// exclude globs. Files that fail to parse are still added and
    /// reported.
    Add {
        /// Files or directories to add.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Comma-separated tags applied to every added document.
        #[arg(long)]
        tag: Option<String>,

        /// Folder prefix; directory structure below it is preserved.
        #[arg(long, default_value = "")]
        folder: String,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` on a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// List documents, newest first.
    List {
        /// Only show documents whose name, folder, or tags contain this text.
        #[arg(long)]
        filter: Option<String>,

        /// Mark documents assigned to this character as `active`.
        #[arg(long)]
        character: Option<String>,
    },

    /// Show a document's metadata, versions, and chunk preview.
    Show { id: String },

    /// Rename a document.
    Rename { id: String, name: String },

    /// Delete a document with its versions, chunks, and assignments.
    Delete { id: String },

    /// Preprocess and chunk a document into a new active version.
    ///
    /// Unset options keep the document's last settings.
    Reprocess {
        id: String,

        /// Chunking strategy: `paragraph`, `token`, `section`, or `whole`.
        #[arg(long)]
        strategy: Option<String>,

        /// Words per chunk for the `token` strategy (minimum 20).
        #[arg(long)]
        token_size: Option<usize>,

        /// Preset: `none`, `summarize`, `bullets`, or `qa-clean`.
        #[arg(long)]
        preset: Option<String>,

        /// Custom instruction (`lowercase`, `uppercase`, `trim lines`).
        #[arg(long)]
        custom: Option<String>,
    },

    /// Replace a document's file and commit it as a new version.
    UploadVersion { id: String, path: PathBuf },

    /// List a document's versions, newest first.
    Versions { id: String },

    /// Print the chunks of a version.
    Chunks { version_id: String },

    /// Make a version the document's active version.
    Activate { id: String, version_id: String },

    /// Edit tags and folder on one or more documents.
    Tag {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Replace tags (comma-separated).
        #[arg(long)]
        set: Option<String>,

        /// Add tags (comma-separated).
        #[arg(long)]
        add: Option<String>,

        /// Remove tags (comma-separated).
        #[arg(long)]
        remove: Option<String>,

        /// Move to this folder.
        #[arg(long)]
        folder: Option<String>,
    },

    /// Assign a document to a character.
    Assign { character: String, id: String },

    /// Remove a document from a character.
    Unassign { character: String, id: String },

    /// Pin a version for a character (the active version if omitted;
    /// pass "" to clear).
    Pin {
        character: String,
        id: String,
        version_id: Option<String>,
    },

    /// List the documents assigned to a character.
    Docs {
        character: String,

        #[arg(long)]
        json: bool,
    },

    /// Assemble a character's context for a query.
    Context {
        character: String,
        query: String,

        /// Total token budget (defaults to `[budget].default_budget`).
        #[arg(long)]
        budget: Option<usize>,

        /// Tokens held back for the reply (at least 300).
        #[arg(long)]
        reserve: Option<usize>,

        /// Print the bundle as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export the library as JSON (stdout unless --output is given).
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Replace the library with a JSON snapshot.
    Import { path: PathBuf },

    /// Show library statistics.
    Stats,
}

fn parse_progress(value: Option<&str>) -> anyhow::Result<ProgressMode> {
    match value {
        None => Ok(ProgressMode::default_for_tty()),
        Some("off") => Ok(ProgressMode::Off),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some(other) => anyhow::bail!("unknown progress mode '{}': use off, human, or json", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add {
            paths,
            tag,
            folder,
            progress,
        } => {
            let tags = tag.as_deref().map(parse_tag_list).unwrap_or_default();
            let mode = parse_progress(progress.as_deref())?;
            ingest::run_add(&cfg, &paths, &tags, &folder, mode).await?;
        }
        Commands::List { filter, character } => {
            get::run_list(&cfg, filter.as_deref(), character.as_deref()).await?;
        }
        Commands::Show { id } => {
            get::run_show(&cfg, &id).await?;
        }
        Commands::Rename { id, name } => {
            edit_cmd::run_rename(&cfg, &id, &name).await?;
        }
        Commands::Delete { id } => {
            edit_cmd::run_delete(&cfg, &id).await?;
        }
        Commands::Reprocess {
            id,
            strategy,
            token_size,
            preset,
            custom,
        } => {
            let args = ReprocessArgs {
                strategy,
                token_size,
                preset,
                custom,
            };
            version_cmd::run_reprocess(&cfg, &id, &args).await?;
        }
        Commands::UploadVersion { id, path } => {
            version_cmd::run_upload_version(&cfg, &id, &path).await?;
        }
        Commands::Versions { id } => {
            version_cmd::run_versions(&cfg, &id).await?;
        }
        Commands::Chunks { version_id } => {
            version_cmd::run_chunks(&cfg, &version_id).await?;
        }
        Commands::Activate { id, version_id } => {
            version_cmd::run_activate(&cfg, &id, &version_id).await?;
        }
        Commands::Tag {
            ids,
            set,
            add,
            remove,
            folder,
        } => {
            let args = TagArgs {
                set,
                add,
                remove,
                folder,
            };
            edit_cmd::run_tag(&cfg, &ids, &args).await?;
        }
        Commands::Assign { character, id } => {
            assign_cmd::run_assign(&cfg, &character, &id).await?;
        }
        Commands::Unassign { character, id } => {
            assign_cmd::run_unassign(&cfg, &character, &id).await?;
        }
        Commands::Pin {
            character,
            id,
            version_id,
        } => {
            assign_cmd::run_pin(&cfg, &character, &id, version_id.as_deref()).await?;
        }
        Commands::Docs { character, json } => {
            assign_cmd::run_docs(&cfg, &character, json).await?;
        }
        Commands::Context {
            character,
            query,
            budget,
            reserve,
            json,
        } => {
            context_cmd::run_context(&cfg, &character, &query, budget, reserve, json).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Import { path } => {
            export::run_import(&cfg, &path).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
