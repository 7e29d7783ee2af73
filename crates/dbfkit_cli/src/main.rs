//! dbfkit CLI
//!
//! Command-line tools for dBASE/FoxPro tables, driven through the session
//! engine.
//!
//! # Commands
//!
//! - `inspect` - Display table structure and tags
//! - `list` - Walk a table in the selected order
//! - `locate` - Print record numbers matching an expression
//! - `seek` - Search an index tag for a key
//! - `sort` - Build a temporary index and print its order
//! - `status` - Print the session state after opening tables
//! - `tag` - Add or remove a production index tag

mod commands;

use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// dbfkit command-line table tools.
#[derive(Parser)]
#[command(name = "dbfkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Hide deleted records
    #[arg(global = true, short = 'd', long)]
    skip_deleted: bool,

    /// Open tables exclusively
    #[arg(global = true, short = 'x', long)]
    exclusive: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display table structure and tags
    Inspect {
        /// Table file
        table: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Walk a table in the selected order
    List {
        /// Table file
        table: PathBuf,

        /// Index tag to order by
        #[arg(short, long)]
        order: Option<String>,

        /// Only print records matching this expression
        #[arg(short, long)]
        filter: Option<String>,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Field delimiter
        #[arg(long, default_value = ",")]
        delimiter: String,
    },

    /// Print record numbers matching an expression
    Locate {
        /// Table file
        table: PathBuf,

        /// Condition, e.g. "BALANCE > 0"
        expression: String,
    },

    /// Search an index tag for a key
    Seek {
        /// Table file
        table: PathBuf,

        /// Key to search for
        key: String,

        /// Tag to search; defaults to the selected order
        #[arg(short, long)]
        tag: Option<String>,

        /// Date format for date keys
        #[arg(long)]
        date_format: Option<String>,
    },

    /// Build a temporary index and print its order
    Sort {
        /// Table file
        table: PathBuf,

        /// Key expression
        expression: String,

        /// Only include records matching this expression
        #[arg(short, long)]
        filter: Option<String>,

        /// Descending order
        #[arg(long)]
        descending: bool,
    },

    /// Print the session state after opening tables
    Status {
        /// Table files, opened in order
        #[arg(required = true)]
        tables: Vec<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Add or remove a production index tag
    Tag {
        /// Table file
        table: PathBuf,

        /// Tag name
        name: String,

        /// Key expression; required unless removing
        expression: Option<String>,

        /// Only index records matching this expression
        #[arg(short, long)]
        filter: Option<String>,

        /// Descending order
        #[arg(long)]
        descending: bool,

        /// Reject duplicate keys
        #[arg(short, long)]
        unique: bool,

        /// Remove the tag instead
        #[arg(short, long)]
        remove: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let options = commands::Options {
        skip_deleted: cli.skip_deleted,
        exclusive: cli.exclusive,
    };
    let mut out = io::stdout().lock();

    match cli.command {
        Commands::Inspect { table, format } => {
            commands::inspect::run(&mut out, &options, &table, &format)?;
        }
        Commands::List {
            table,
            order,
            filter,
            limit,
            delimiter,
        } => {
            let list = commands::list::ListArgs {
                order: order.as_deref(),
                filter: filter.as_deref(),
                limit,
                delimiter: &delimiter,
            };
            commands::list::run(&mut out, &options, &table, &list)?;
        }
        Commands::Locate { table, expression } => {
            commands::locate::run(&mut out, &options, &table, &expression)?;
        }
        Commands::Seek {
            table,
            key,
            tag,
            date_format,
        } => {
            commands::seek::run(
                &mut out,
                &options,
                &table,
                &key,
                tag.as_deref(),
                date_format.as_deref(),
            )?;
        }
        Commands::Sort {
            table,
            expression,
            filter,
            descending,
        } => {
            commands::sort::run(
                &mut out,
                &options,
                &table,
                &expression,
                filter.as_deref(),
                descending,
            )?;
        }
        Commands::Status { tables, format } => {
            commands::status::run(&mut out, &options, &tables, &format)?;
        }
        Commands::Tag {
            table,
            name,
            expression,
            filter,
            descending,
            unique,
            remove,
        } => {
            let action = if remove {
                commands::tag::TagAction::Remove(&name)
            } else {
                let expression = expression.ok_or("Key expression required to add a tag")?;
                commands::tag::TagAction::Add(
                    dbfkit_engine::TagSpec::new(&name, &expression)
                        .filter(filter.as_deref())
                        .descending(descending)
                        .unique(unique),
                )
            };
            commands::tag::run(&mut out, &options, &table, &action)?;
        }
        Commands::Version => {
            println!("dbfkit CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
