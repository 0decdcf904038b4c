//! A tiny CLI that drives `vm_core::embed::Embedding` over a source file
//! written in the bundled toy syntax, the way a standalone interpreter
//! binary would wrap an embeddable VM (teacher precedent: `tools/fvm-bench`
//! wrapping `fvm` for ad hoc script-driven runs).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vm_bridge::Bridge;
use vm_core::embed::Embedding;
use vm_core::SandboxConfig;

#[derive(Parser, Debug)]
#[command(name = "vm-run", about = "Run a toy-syntax source file against the prototype VM")]
struct Cli {
    /// Source file to parse and evaluate.
    file: PathBuf,

    /// Abort the run after this many dispatched messages.
    #[arg(long)]
    message_limit: Option<u64>,

    /// Abort the run after this many milliseconds.
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// Start the Synaptic Bridge with this many workers before running.
    #[arg(long)]
    bridge_workers: Option<u32>,

    /// Extra arguments exposed to the script as the `Args` slot.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut sandbox = SandboxConfig::unbounded();
    if let Some(limit) = cli.message_limit {
        sandbox = sandbox.with_message_count_limit(limit);
    }
    if let Some(ms) = cli.time_limit_ms {
        sandbox = sandbox.with_time_limit(Duration::from_millis(ms));
    }

    let mut bridge = cli.bridge_workers.map(|workers| {
        let mut bridge = Bridge::new();
        bridge.start(workers).expect("bridge failed to start");
        log::info!("bridge started with {workers} worker(s): {:?}", bridge.status());
        bridge
    });

    let mut embedding = Embedding::new(sandbox);
    embedding.set_print_callback(|text| println!("{text}"));
    embedding.set_exception_callback(|fault| eprintln!("unhandled fault: {fault}"));
    embedding.set_cli_args(&cli.args);

    if let Err(fault) = embedding.do_file(&cli.file) {
        log::error!("run failed: {fault}");
    }

    if let Some(bridge) = bridge.take() {
        bridge.stop();
    }

    std::process::exit(embedding.exit_result());
}
