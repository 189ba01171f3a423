#![forbid(unsafe_code)]

//! pctr — gate-occupancy monitor CLI entry point.

use clap::Parser;

fn main() {
    let args = people_counter::cli::Cli::parse();
    if let Err(e) = people_counter::cli::run(&args) {
        eprintln!("pctr: {e}");
        std::process::exit(1);
    }
}
