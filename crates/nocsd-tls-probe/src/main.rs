//! # nocsd-tls-probe
//!
//! Checks that a preload library does not use up a static TLS slot.
//!
//! Libraries with static TLS can only be `dlopen`ed while the dynamic
//! linker has surplus static TLS left. The probe loads numbered dummy
//! libraries until one fails, on a worker thread so the DTV is in play,
//! and prints how many it managed. Comparing the count with and without
//! the layer preloaded shows whether the layer took a slot.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

mod sequence;

use sequence::{load_sequence, DlopenLoader, ALPHABET};

#[derive(Parser)]
#[command(name = "nocsd-tls-probe")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Name of the preloaded library, echoed in error lines
    #[arg(value_name = "PRELOADED", default_value = "none")]
    preloaded: String,

    /// Directory holding libdummy-<c>.so.0
    #[arg(long, value_name = "DIR", default_value = "testlibs")]
    lib_dir: PathBuf,

    /// Stop after this many libraries
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GTK3_NOCSD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let limit = cli.limit.unwrap_or(ALPHABET.len()).min(ALPHABET.len());
    let names = &ALPHABET[..limit];
    let lib_dir = cli.lib_dir;

    // Static TLS of dlopened objects only goes through the DTV off the
    // main thread.
    let worker = std::thread::Builder::new()
        .name("tls-probe".into())
        .spawn(move || load_sequence(names, &mut DlopenLoader::new(lib_dir)));

    let outcome = match worker {
        Ok(handle) => handle.join(),
        Err(e) => {
            println!(
                "ERROR[preloaded = {}]: could not create thread: {}",
                cli.preloaded, e
            );
            return Ok(ExitCode::FAILURE);
        }
    };

    match outcome {
        Ok(Ok(count)) => println!("{count}"),
        Ok(Err(e)) => println!("ERROR[preloaded = {}]: {}", cli.preloaded, e),
        Err(_) => anyhow::bail!("probe thread panicked"),
    }
    Ok(ExitCode::SUCCESS)
}
