//! The migration command of the iib web application.
//!
//! ```text
//! cargo run --example iib -- history
//! cargo run --example iib -- upgrade head --sql
//! STEPLADDER_DATABASE_URL=postgresql://localhost/iib cargo run --example iib -- upgrade
//! ```

mod revisions;

use std::process::ExitCode;

use clap::Parser;

use stepladder::cli::{self, Cli};
use stepladder::revision_graph::RevisionGraph;

fn main() -> ExitCode {
    let graph = match RevisionGraph::new(revisions::all()) {
        Ok(graph) => graph,
        Err(error) => {
            eprintln!("Invalid revision graph: {}", error);
            return ExitCode::FAILURE;
        }
    };
    cli::run(&graph, Cli::parse())
}
