use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OpenFlags};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lotbuild::config::BuildConfig;
use lotbuild::output::unposted_ids;
use lotbuild::pipeline::build;

#[derive(Parser)]
#[command(name = "lotbuild")]
#[command(about = "Build a normalized lots table from municipal open-data extracts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every configured source and rebuild the lots table
    Build {
        /// Build configuration (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Write to this database instead of the configured one
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List lots the consumer has not posted yet
    Unposted {
        #[arg(long)]
        db: PathBuf,
        #[arg(long, default_value = "lots")]
        table: String,
        #[arg(long, default_value_t = 1)]
        limit: usize,
    },
}

fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("lotbuild=info"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { config, output } => {
            let mut cfg = BuildConfig::load(&config)
                .with_context(|| format!("reading build config {}", config.display()))?;
            if let Some(path) = output {
                cfg.output.path = path;
            }

            let report = build(&cfg)
                .with_context(|| format!("building {}", cfg.output.path.display()))?;
            println!("{report}");
        }
        Commands::Unposted { db, table, limit } => {
            let conn = Connection::open_with_flags(&db, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .with_context(|| format!("opening {}", db.display()))?;
            for id in unposted_ids(&conn, &table, limit)? {
                println!("{id}");
            }
        }
    }
    Ok(())
}
