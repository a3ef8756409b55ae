//! Keystone CLI
//!
//! Validates entity descriptions and shows the key columns and DDL the
//! registry derives from them.

use clap::{Parser, Subcommand};
use colored::Colorize;
use keystone::{Dialect, OrmConfig};
use keystone_cli::{check_report, columns_report, ddl_report, load_graph};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "keystone")]
#[command(about = "Inspect composite keys of keystone entity descriptions")]
#[command(version = "0.1.0")]
struct Cli {
    /// Entity description file (JSON); defaults to `orm.entities_file`
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Configuration file
    #[arg(long, default_value = "config/keystone.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the descriptions and report every entity
    Check,

    /// Show resolved key and foreign key columns
    Columns {
        /// Only this entity
        entity: Option<String>,
    },

    /// Print CREATE TABLE statements in dependency order
    Ddl {
        /// postgres, sqlite or mysql; defaults to `orm.dialect`
        #[arg(long)]
        dialect: Option<Dialect>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(output) => {
            print!("{output}");
            if !cli.quiet {
                eprintln!("{}", "✅ Success".green());
            }
        }
        Err(e) => {
            eprintln!("{} {e:#}", "❌ Error:".red().bold());
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<String> {
    let config = OrmConfig::load_from(&cli.config)?;
    let graph = load_graph(cli.file.as_deref(), &config)?;
    log::debug!("Registered {} entities", graph.len());

    match &cli.command {
        Commands::Check => check_report(&graph),
        Commands::Columns { entity } => columns_report(&graph, entity.as_deref()),
        Commands::Ddl { dialect } => Ok(ddl_report(&graph, dialect.unwrap_or(config.dialect))),
    }
}
