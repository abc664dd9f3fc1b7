//! Command dispatch for the snapclust binary: each subcommand opens the
//! store, runs its operation inside a transaction where it mutates, and
//! persists on success.

mod commands;

use anyhow::Result;

use parser::{Cli, Commands};

pub fn run(cli: Cli) -> Result<()> {
    match cli.commands {
        Commands::AddReference { common, args } => commands::add_reference(&common, &args),
        Commands::AddSample { common, args } => commands::add_sample(&common, &args),
        Commands::ClusterSample { common, args } => commands::cluster_sample(&common, &args),
        Commands::RemoveSample { common, args } => commands::remove_sample(&common, &args),
        Commands::Closest { common, args } => commands::closest(&common, &args),
        Commands::Within { common, args } => commands::within(&common, &args),
        Commands::Address { common, args } => commands::address(&common, &args),
        Commands::History { common, args } => commands::history(&common, &args),
        Commands::Export { common, args } => commands::export(&common, &args),
    }
}

/// Map a failed run onto the process exit code: 1 for validation, state and
/// admissibility failures, 2 for store or integrity failures.
#[must_use]
pub fn exit_code(error: &anyhow::Error) -> i32 {
    use store::ErrorKind;

    let kind = if let Some(e) = error.downcast_ref::<store::StoreError>() {
        e.kind()
    } else if let Some(e) = error.downcast_ref::<cluster::ClusterError>() {
        e.kind()
    } else if let Some(e) = error.downcast_ref::<query::QueryError>() {
        match e {
            query::QueryError::Store(inner) => inner.kind(),
            query::QueryError::Distance(distance::DistanceError::Store(inner)) => inner.kind(),
            query::QueryError::Distance(distance::DistanceError::Cancelled) => ErrorKind::State,
        }
    } else if let Some(e) = error.downcast_ref::<ingest::IngestError>() {
        match e {
            ingest::IngestError::Open { .. } => ErrorKind::Store,
            _ => ErrorKind::Input,
        }
    } else if error.downcast_ref::<parser::ParserError>().is_some() {
        ErrorKind::Input
    } else {
        ErrorKind::Store
    };

    match kind {
        ErrorKind::Input | ErrorKind::State => 1,
        ErrorKind::Integrity | ErrorKind::Store => 2,
    }
}
