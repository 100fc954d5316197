//! Two-core SMP simulator CLI.
//!
//! This binary loads one program per file, runs them on the simulated machine
//! and prints the final state. It performs:
//! 1. **Configuration:** Built-in defaults, an optional JSON config file, then flag overrides.
//! 2. **Run modes:** Straight to completion, or slow mode pausing every N cycles.
//! 3. **Reporting:** Data memory, both data caches, every retired context and the
//!    statistics, as text or as JSON.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::{fs, process};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use smpsim_core::common::constants::BLOCK_SIZE;
use smpsim_core::common::data::CoreId;
use smpsim_core::common::error::SimError;
use smpsim_core::core::units::cache::LineState;
use smpsim_core::sim::loader;
use smpsim_core::{Config, SimReport, Simulator};

#[derive(Parser, Debug)]
#[command(
    name = "sim",
    author,
    version,
    about = "Cycle-accurate two-core simulator with MSI-coherent caches",
    long_about = "Runs each program file as one context. Core 0 hides miss latency by running a second context while a helper resolves the miss; core 1 blocks on every miss.\n\nExamples:\n  sim programs/*.txt\n  sim --quantum 10 --step 50 a.txt b.txt c.txt\n  sim --config machine.json --json a.txt"
)]
struct Cli {
    /// Program files, one context each, in load order.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Instructions a context may run before yielding its core.
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    quantum: Option<u32>,

    /// JSON configuration file; flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Slow mode: pause every N cycles until Enter is pressed.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    step: Option<u64>,

    /// Log scheduling events at debug level.
    #[arg(long)]
    trace: bool,

    /// Print the final report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("\n[!] FATAL: {err}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(quantum) = cli.quantum {
        config.general.max_quantum = quantum;
    }
    config.general.trace |= cli.trace;
    init_tracing(config.general.trace);

    let program = loader::load_files(&cli.files)?;
    if !cli.json {
        println!(
            "[*] {} contexts, quantum {}, memory latency {}, cache lines {}/{}",
            program.contexts.len(),
            config.general.max_quantum,
            config.memory.latency,
            config.cache.core0_lines,
            config.cache.core1_lines
        );
    }

    let mut sim = Simulator::new(config, program)?;
    sim.start()?;
    let driven = match cli.step {
        Some(every) => step_mode(&mut sim, every),
        None => sim.run_to_completion(),
    };
    // A core fault surfaces as `Aborted` in the orchestrator; `finish` reports the cause.
    let report = sim.finish()?;
    driven?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config, SimError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path).map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Config::from_json(&text)
}

fn init_tracing(trace: bool) {
    let filter = if trace {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_thread_names(true)
        .init();
}

/// Runs `every` cycles at a time, printing what each core runs in between.
///
/// At end of input the run continues without pausing.
fn step_mode(sim: &mut Simulator, every: u64) -> Result<(), SimError> {
    let stdin = io::stdin();
    let mut line = String::new();
    while sim.is_running() {
        let _ = sim.step(every)?;
        let running = CoreId::ALL.map(|core| {
            sim.running_context(core)
                .map_or_else(|| "idle".to_owned(), |id| format!("context {id}"))
        });
        println!(
            "[cycle {:>6}] core 0: {:<12} core 1: {}",
            sim.cycle(),
            running[0],
            running[1]
        );
        if !sim.is_running() {
            break;
        }
        print!("  press Enter to continue...");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return sim.run_to_completion(),
            Ok(_) => {}
        }
    }
    Ok(())
}

fn print_report(report: &SimReport) {
    println!("\nDATA MEMORY");
    for (index, block) in report.memory.iter().enumerate() {
        let words: Vec<String> = block.0.iter().map(|w| format!("{w:>6}")).collect();
        println!(
            "  block {index:>2} [{:>3}..{:>3}]: {}",
            index as u32 * BLOCK_SIZE,
            (index as u32 + 1) * BLOCK_SIZE - 1,
            words.join(" ")
        );
    }

    for (core, lines) in report.data_caches.iter().enumerate() {
        println!("\nCORE {core} DATA CACHE");
        for (index, line) in lines.iter().enumerate() {
            match line.tag {
                Some(tag) if line.state != LineState::Invalid => {
                    let words: Vec<String> =
                        line.block.0.iter().map(|w| format!("{w:>6}")).collect();
                    println!(
                        "  line {index}: block {tag:>2} {} {}",
                        line.state,
                        words.join(" ")
                    );
                }
                _ => println!("  line {index}: {}", LineState::Invalid),
            }
        }
    }

    println!("\nCONTEXTS");
    for ctx in &report.contexts {
        let core = ctx
            .retired_by
            .map_or_else(|| "-".to_owned(), |core| core.to_string());
        println!(
            "  context {} | retired on core {core} | {} cycles",
            ctx.id, ctx.cycles
        );
        for row in ctx.registers.to_string().lines() {
            println!("    {row}");
        }
    }
    report.stats.print();
}
