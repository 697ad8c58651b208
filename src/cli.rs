//! Command-line front end. Applications build their `RevisionGraph` and hand it to `run`:
//!
//! ```no_run
//! use clap::Parser;
//! # fn revisions() -> Vec<stepladder::revision::Revision> { Vec::new() }
//!
//! fn main() -> std::process::ExitCode {
//!     let graph = match stepladder::revision_graph::RevisionGraph::new(revisions()) {
//!         Ok(graph) => graph,
//!         Err(error) => {
//!             eprintln!("Invalid revision graph: {}", error);
//!             return std::process::ExitCode::FAILURE;
//!         }
//!     };
//!     stepladder::cli::run(&graph, stepladder::cli::Cli::parse())
//! }
//! ```

use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, Overrides};
use crate::error::{Base, Error};
use crate::executor::Migrator;
use crate::memory::verify_reversibility;
use crate::planner::{self, Direction, Target};
use crate::postgres_backend::PostgresBackend;
use crate::revision_graph::RevisionGraph;
use crate::Result;

#[derive(Debug, Parser)]
#[command(about = "Apply, revert and inspect schema revisions")]
pub struct Cli {
    /// Path to a TOML config file [default: ./stepladder.toml if present]
    #[arg(long, env = "STEPLADDER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "STEPLADDER_DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "STEPLADDER_VERSION_TABLE", global = true)]
    pub version_table: Option<String>,

    #[arg(long, env = "STEPLADDER_VERSION_SCHEMA", global = true)]
    pub version_schema: Option<String>,

    /// Key of the PostgreSQL advisory lock held while migrating
    #[arg(long, env = "STEPLADDER_LOCK_KEY", global = true, allow_negative_numbers = true)]
    pub lock_key: Option<i64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upgrade to a later revision
    Upgrade {
        #[arg(default_value = "head")]
        target: Target,
        /// Print the SQL instead of running it
        #[arg(long)]
        sql: bool,
        /// Starting revision for --sql [default: base]
        #[arg(long, requires = "sql")]
        from: Option<Target>,
    },
    /// Revert to an earlier revision
    Downgrade {
        target: Target,
        /// Print the SQL instead of running it
        #[arg(long)]
        sql: bool,
        /// Starting revision for --sql
        #[arg(long, requires = "sql")]
        from: Option<Target>,
    },
    /// Show the revision the database is at
    Current,
    /// List revisions, newest first
    History,
    /// List revisions without children
    Heads,
    /// Record a revision as applied without running it
    Stamp { target: Target },
    /// Run every revision up and back down in memory and verify each downgrade
    Check,
    /// Generate an empty revision on top of the current head
    Revision {
        #[arg(short, long)]
        message: String,
        /// Directory the revision file is written to
        #[arg(long, default_value = "migrations")]
        dir: PathBuf,
    },
}

/// Installs a `tracing` subscriber filtered by `STEPLADDER_LOG` (default `info`). Does nothing
/// if the application already installed one.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("STEPLADDER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Runs one command and maps the outcome to a process exit code.
pub fn run(graph: &RevisionGraph, cli: Cli) -> ExitCode {
    init_tracing();
    match execute(graph, cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "command failed");
            eprintln!("Error: {}", error);
            let mut source = error.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

pub fn execute(graph: &RevisionGraph, cli: Cli) -> Result<()> {
    let overrides = Overrides {
        database_url: cli.database_url,
        version_table: cli.version_table,
        version_schema: cli.version_schema,
        lock_key: cli.lock_key,
    };
    let config = Config::load(cli.config.as_deref(), &overrides)?;

    match cli.command {
        Command::Upgrade { target, sql, from } => {
            if sql {
                let from = from.unwrap_or(Target::Base);
                print_script(graph, &config, &from, &target, Direction::Upgrade)
            } else {
                let version = migrator(graph, &config)?.upgrade(&target)?;
                println!("Database is at {}", Base(&version));
                Ok(())
            }
        }
        Command::Downgrade { target, sql, from } => {
            if sql {
                let from = from.ok_or_else(|| {
                    Error::Config("an offline downgrade needs a --from revision".to_owned())
                })?;
                print_script(graph, &config, &from, &target, Direction::Downgrade)
            } else {
                let version = migrator(graph, &config)?.downgrade(&target)?;
                println!("Database is at {}", Base(&version));
                Ok(())
            }
        }
        Command::Current => {
            let version = migrator(graph, &config)?.current()?;
            match version {
                Some(ref id) if graph.heads().iter().any(|head| head.id() == id) => {
                    println!("{} (head)", id)
                }
                _ => println!("{}", Base(&version)),
            }
            Ok(())
        }
        Command::History => {
            let heads = graph.heads();
            for revision in graph.history().into_iter().rev() {
                if heads.iter().any(|head| head.id() == revision.id()) {
                    println!("{} (head)", revision);
                } else {
                    println!("{}", revision);
                }
            }
            Ok(())
        }
        Command::Heads => {
            for head in graph.heads() {
                println!("{}", head.id());
            }
            Ok(())
        }
        Command::Stamp { target } => {
            let version = migrator(graph, &config)?.stamp(&target)?;
            println!("Database is at {}", Base(&version));
            Ok(())
        }
        Command::Check => {
            let checked = verify_reversibility(graph)?;
            println!("{} revisions upgrade and downgrade cleanly", checked);
            Ok(())
        }
        Command::Revision { message, dir } => {
            let parent = planner::resolve_target(graph, None, &Target::Head)?;
            let path = crate::create_revision(&message, parent.as_ref(), &dir)?;
            println!("Created revision {}", path.display());
            Ok(())
        }
    }
}

fn migrator<'g>(
    graph: &'g RevisionGraph,
    config: &Config,
) -> Result<Migrator<'g, PostgresBackend>> {
    let backend = PostgresBackend::connect(config.require_database_url()?, config.version_table())?
        .with_lock_key(config.lock_key);
    Ok(Migrator::new(graph, backend))
}

fn print_script(
    graph: &RevisionGraph,
    config: &Config,
    from: &Target,
    target: &Target,
    direction: Direction,
) -> Result<()> {
    let from = planner::resolve_target(graph, None, from)?;
    let plan = planner::plan(graph, from.as_ref(), target)?;
    if !plan.is_empty() && plan.direction() != direction {
        return Err(Error::WrongDirection {
            direction,
            current: from,
            target: plan.to().cloned(),
        });
    }
    print!("{}", plan.to_sql(&config.version_table()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn upgrade_defaults_to_head() {
        let cli = Cli::try_parse_from(["stepladder", "upgrade"]).unwrap();
        match cli.command {
            Command::Upgrade { target, sql, from } => {
                assert_eq!(target, Target::Head);
                assert!(!sql);
                assert!(from.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_offline_downgrade() {
        let cli = Cli::try_parse_from([
            "stepladder",
            "downgrade",
            "7573241a5156",
            "--sql",
            "--from",
            "9d60d35786c1",
        ])
        .unwrap();
        match cli.command {
            Command::Downgrade { target, sql, from } => {
                assert_eq!(target, Target::Revision("7573241a5156".into()));
                assert!(sql);
                assert_eq!(from, Some(Target::Revision("9d60d35786c1".into())));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn lock_key_is_a_global_flag() {
        let cli = Cli::try_parse_from(["stepladder", "current", "--lock-key", "-17"]).unwrap();
        assert_eq!(cli.lock_key, Some(-17));
    }

    #[test]
    fn downgrade_requires_target() {
        assert!(Cli::try_parse_from(["stepladder", "downgrade"]).is_err());
    }
}
