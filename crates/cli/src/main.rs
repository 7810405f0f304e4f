//! Coherent cache-hierarchy simulator CLI.
//!
//! This binary builds a hierarchy from a JSON config and replays a seeded
//! random coherence workload against it, checking every read against a
//! reference memory image and reporting monitor statistics. It performs:
//! 1. **Config load:** JSON (`--config`) or the built-in default hierarchy.
//! 2. **Workload replay:** Mixed reads/writes/flushes across all cores.
//! 3. **Report:** Access/miss/invalidation counters and accumulated delay.

use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;

use cohsim_core::common::{DataBlock, BLOCK_OFFSET};
use cohsim_core::config::Config;
use cohsim_core::monitor::{Monitor, SimpleAccMonitor, SimpleTracer};

#[derive(Parser, Debug)]
#[command(
    name = "cohsim",
    author,
    version,
    about = "Coherent cache-hierarchy simulator",
    long_about = "Build a cache hierarchy from a JSON config and replay a seeded random\ncoherence workload with result checking.\n\nExamples:\n  cohsim run\n  cohsim run --config hierarchy.json --ops 200000 --seed 7\n  cohsim run --trace"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the hierarchy and replay a random workload.
    Run {
        /// Hierarchy description (JSON); defaults to a 1-core 2-level MSI tree.
        #[arg(short, long)]
        config: Option<String>,

        /// Number of driver operations to replay.
        #[arg(long, default_value_t = 100_000)]
        ops: u64,

        /// Workload seed.
        #[arg(long, default_value_t = 1201)]
        seed: u64,

        /// Number of distinct addresses per core plus a shared pool.
        #[arg(long, default_value_t = 256)]
        addrs: usize,

        /// Emit a per-access trace.
        #[arg(long)]
        trace: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            ops,
            seed,
            addrs,
            trace,
        } => cmd_run(config.as_deref(), ops, seed, addrs, trace),
    }
}

fn load_config(path: Option<&str>) -> Config {
    match path {
        None => Config::default(),
        Some(p) => {
            let text = std::fs::read_to_string(p).unwrap_or_else(|e| {
                eprintln!("cohsim: cannot read config `{p}`: {e}");
                process::exit(1);
            });
            serde_json::from_str(&text).unwrap_or_else(|e| {
                eprintln!("cohsim: cannot parse config `{p}`: {e}");
                process::exit(1);
            })
        }
    }
}

/// Deterministic 64-bit mixer used to derive the workload stream.
fn mix(seed: u64, i: u64) -> u64 {
    let mut z = i.wrapping_add(seed).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn cmd_run(config: Option<&str>, ops: u64, seed: u64, addrs: usize, trace: bool) {
    let config = load_config(config);
    let hierarchy = cohsim_core::hierarchy::build(&config).unwrap_or_else(|e| {
        eprintln!("cohsim: {e}");
        process::exit(1);
    });

    let stats = Arc::new(SimpleAccMonitor::new(true));
    let stats_monitor: Arc<dyn Monitor> = Arc::clone(&stats) as Arc<dyn Monitor>;
    hierarchy.attach_monitor(&stats_monitor);
    if trace {
        let tracer: Arc<dyn Monitor> = Arc::new(SimpleTracer::new(false));
        tracer.start();
        hierarchy.attach_monitor(&tracer);
    }

    // Address pool: 48-bit block-aligned addresses, a private range per core
    // plus a shared range.
    let cores = hierarchy.cores.len();
    let total = addrs * (cores + 1);
    let addr_mask = 0x0000_FFFF_FFFF_FFC0u64;
    let pool: Vec<u64> = (0..total as u64).map(|i| mix(seed, i) & addr_mask).collect();
    let mut reference: std::collections::HashMap<u64, DataBlock> =
        std::collections::HashMap::new();

    let mut delay = 0u64;
    let mut gi = seed.wrapping_mul(0x0703);
    let mut failures = 0u64;
    for _ in 0..ops {
        gi = gi.wrapping_add(1);
        let core = (mix(seed, gi) % cores as u64) as usize;
        gi = gi.wrapping_add(1);
        let shared = mix(seed, gi) & 0x7 == 0; // 1/8 shared
        gi = gi.wrapping_add(1);
        let idx = if shared {
            cores * addrs + (mix(seed, gi) as usize % addrs)
        } else {
            core * addrs + (mix(seed, gi) as usize % addrs)
        };
        let addr = pool[idx];
        gi = gi.wrapping_add(1);
        let roll = mix(seed, gi) & 0xF;
        if roll < 4 || !reference.contains_key(&addr) {
            gi = gi.wrapping_add(1);
            let block = DataBlock::splat(mix(seed, gi));
            hierarchy.cores[core].write(addr, &block, Some(&mut delay));
            let _prev = reference.insert(addr, block);
        } else if roll == 4 {
            hierarchy.cores[core].flush(addr, Some(&mut delay));
        } else if roll == 5 {
            hierarchy.cores[core].writeback(addr, Some(&mut delay));
        } else {
            let got = hierarchy.cores[core].read(addr, Some(&mut delay));
            let want = reference[&addr];
            if got != want {
                failures += 1;
                eprintln!(
                    "cohsim: mismatch at {addr:#x}: read {:#x}, expected {:#x}",
                    got.read(0),
                    want.read(0)
                );
            }
        }
    }

    println!("ops            : {ops}");
    println!("block bits     : {BLOCK_OFFSET}");
    println!("accesses       : {}", stats.accesses());
    println!("misses         : {}", stats.misses());
    println!("writes         : {}", stats.writes());
    println!("write misses   : {}", stats.write_misses());
    println!("invalidations  : {}", stats.invalidations());
    println!("delay (cycles) : {delay}");
    if failures > 0 {
        eprintln!("cohsim: {failures} read mismatches");
        process::exit(1);
    }
}
