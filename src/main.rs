// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

#![cfg_attr(all(feature = "nightly", test), feature(test))]

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

mod annotate;
mod cmds;
mod json;
mod stream;
mod watchlist_store;
mod web;

// This is either in the environment when `cargo` is invoked or set from within `build.rs`.
const VERSION: &str = env!("VERSION");

fn main() {
    // If using the clock will fail, find out now *before* trying to log
    // anything (with timestamps...) so we can print a helpful error.
    if let Err(e) = nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC) {
        eprintln!(
            "clock_gettime failed: {e}\n\n\
             This indicates a broken environment. See the troubleshooting guide."
        );
        std::process::exit(1);
    }

    base::tracing_setup::install();

    // Get the program name from the OS (e.g. if invoked as `target/debug/facetrack`: `facetrack`),
    // falling back to the crate name if conversion to a path/UTF-8 string fails.
    // `bpaf`'s default logic is similar but doesn't have the fallback.
    let progname = std::env::args_os().next().map(PathBuf::from);
    let progname = progname
        .as_deref()
        .and_then(Path::file_name)
        .and_then(OsStr::to_str)
        .unwrap_or(env!("CARGO_PKG_NAME"));

    let args = match cmds::run::args()
        .fallback_to_usage()
        .run_inner(bpaf::Args::current_args().set_name(progname))
    {
        Ok(a) => a,
        Err(e) => std::process::exit(e.exit_code()),
    };
    tracing::trace!("parsed command-line arguments: {args:#?}");

    match cmds::run::run(args) {
        Err(e) => {
            error!(err = %e.chain(), "exiting due to error");
            ::std::process::exit(1);
        }
        Ok(rv) => {
            debug!("exiting with status {}", rv);
            std::process::exit(rv)
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn bpaf_invariants() {
        super::cmds::run::args().check_invariants(false);
    }
}
