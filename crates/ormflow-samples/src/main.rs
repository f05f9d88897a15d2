//! ormflow sample scenarios
//!
//! Runs small end-to-end scenarios against an in-memory or file SQLite
//! database and prints the resulting entity graphs as JSON.

mod scenarios;

use clap::{Parser, Subcommand};
use ormflow::{ConnectionOptions, DriverOptions, LoggingOptions};
use tracing_subscriber::EnvFilter;

/// ormflow sample scenarios
#[derive(Parser, Debug)]
#[command(name = "ormflow-samples")]
#[command(version, about = "Run ormflow sample scenarios against SQLite")]
pub struct Args {
    /// SQLite database file, or `:memory:`
    #[arg(short, long, default_value = ":memory:")]
    pub database: String,

    /// Naming strategy (default, snake_case)
    #[arg(long)]
    pub naming_strategy: Option<String>,

    /// Log every statement at info level
    #[arg(long)]
    pub log_queries: bool,

    #[command(subcommand)]
    pub scenario: Scenario,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Post and author saved through a many-to-one cascade
    ManyToOne,
    /// Entity listeners reporting lifecycle events
    Listeners,
    /// Questions and categories linked through a junction table
    ManyToMany,
    /// Relations loaded on first access
    Lazy,
    /// Category tree stored in a closure table
    Tree,
    /// Every scenario in turn
    All,
}

impl Args {
    fn connection_options(&self) -> ConnectionOptions {
        let mut options = ConnectionOptions::new(DriverOptions::sqlite(&self.database))
            .with_name("samples");
        if let Some(strategy) = &self.naming_strategy {
            options = options.with_naming_strategy(strategy);
        }
        if self.log_queries {
            options = options.with_logging(LoggingOptions::all());
        }
        options
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ormflow=info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let options = args.connection_options();
    let selected = match args.scenario {
        Scenario::All => vec![
            Scenario::ManyToOne,
            Scenario::Listeners,
            Scenario::ManyToMany,
            Scenario::Lazy,
            Scenario::Tree,
        ],
        scenario => vec![scenario],
    };

    for scenario in selected {
        println!("== {:?}", scenario);
        match scenario {
            Scenario::ManyToOne => scenarios::many_to_one(options.clone()).await?,
            Scenario::Listeners => scenarios::listeners(options.clone()).await?,
            Scenario::ManyToMany => scenarios::many_to_many(options.clone()).await?,
            Scenario::Lazy => scenarios::lazy(options.clone()).await?,
            Scenario::Tree => scenarios::tree(options.clone()).await?,
            Scenario::All => {}
        }
    }
    Ok(())
}
