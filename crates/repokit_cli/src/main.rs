//! CLI probe for discovery.
//!
//! # Responsibility
//! - Scan one directory and print the registry it yields.
//! - Keep output deterministic (sorted keys) for quick local checks.

use repokit_core::{scan, RegistryError};
use std::process::ExitCode;

const USAGE: &str = "usage: repokit <root_dir> <suffix> [path_filter]";

fn main() -> ExitCode {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (root_dir, suffix, path_filter) = match args.as_slice() {
        [root, suffix] => (root, suffix, None),
        [root, suffix, filter] => (root, suffix, Some(filter.as_str())),
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match scan(root_dir, suffix, path_filter) {
        Ok(registry) => {
            for (key, implementation_id) in registry.iter() {
                println!("{key}\t{implementation_id}");
            }
            ExitCode::SUCCESS
        }
        Err(err @ RegistryError::RootNotFound(_)) => {
            eprintln!("repokit {}: {err}", repokit_core::core_version());
            ExitCode::from(3)
        }
        Err(err) => {
            eprintln!("repokit: {err}");
            ExitCode::FAILURE
        }
    }
}
