//! Kernel Simulator - Main Entry Point
//!
//! Usage: kernel-sim [OPTIONS] <program>...
//!
//! Arguments:
//!   program - One or more process image files (.text/.data hex encoding)
//!
//! Options:
//!   --cpus N            CPUs in the simulated machine (default 1)
//!   --cores N           Cores per CPU (default 1)
//!   --threads N         Hardware threads per core (default 2)
//!   --clock HZ          Master clock rate, 1Hz..1GHz (default 1000)
//!   --scheduler-rate HZ Schedule-pass frequency (default 100)
//!   --generator-rate HZ Process-generator frequency (default 10)
//!   --quantum MS        Quantum per process in milliseconds (default 10)
//!   --max-pulses N      Stop after N pulses (default: run until drained)
//!   --dump-dir DIR      Dump halting processes into DIR
//!   -v, --verbose       Per-instruction and translation traces
//!   -h, --help          Print help information

use std::env;
use std::process;

use anyhow::{Context, Result, bail};
use log::{error, warn};

use kernel_sim::kernel::Kernel;
use kernel_sim::loader::ProgramImage;
use kernel_sim::machine::MachineConfig;

struct CliConfig {
    machine: MachineConfig,
    max_pulses: Option<u64>,
    dump_dir: Option<std::path::PathBuf>,
    programs: Vec<String>,
    verbose: bool,
}

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if config.verbose { "debug" } else { "info" },
    ))
    .init();

    if let Err(e) = run(&config) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn print_help(program: &str) {
    eprintln!("Kernel Simulator - multi-core machine with demand paging and round-robin scheduling");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] <program>...", program);
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  program - process image files (.text/.data hex encoding)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --cpus N             CPUs in the simulated machine (default 1)");
    eprintln!("  --cores N            Cores per CPU (default 1)");
    eprintln!("  --threads N          Hardware threads per core (default 2)");
    eprintln!("  --clock HZ           Master clock rate, 1Hz..1GHz (default 1000)");
    eprintln!("  --scheduler-rate HZ  Schedule-pass frequency (default 100)");
    eprintln!("  --generator-rate HZ  Process-generator frequency (default 10)");
    eprintln!("  --quantum MS         Quantum per process in ms (default 10)");
    eprintln!("  --max-pulses N       Stop after N pulses (default: run until drained)");
    eprintln!("  --dump-dir DIR       Dump halting processes into DIR");
    eprintln!("  -v, --verbose        Per-instruction and translation traces");
    eprintln!("  -h, --help           Print this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} programs/prog000.img", program);
    eprintln!("  {} --cpus 2 --cores 2 --threads 2 --clock 10000 programs/*.img", program);
}

fn parse_args() -> Result<CliConfig> {
    let args: Vec<String> = env::args().collect();
    let program = &args[0];

    let mut machine = MachineConfig {
        num_cpus: 1,
        cores_per_cpu: 1,
        threads_per_core: 2,
        clock_rate: 1000,
        scheduler_rate: 100,
        generator_rate: 10,
        quantum_ms: 10,
    };
    let mut max_pulses = None;
    let mut dump_dir = None;
    let mut verbose = false;
    let mut programs = Vec::new();

    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| -> Result<&String> {
            iter.next()
                .with_context(|| format!("option {} requires a value", name))
        };
        match arg.as_str() {
            "-h" | "--help" => {
                print_help(program);
                process::exit(0);
            }
            "-v" | "--verbose" => verbose = true,
            "--cpus" => machine.num_cpus = value("--cpus")?.parse().context("bad --cpus")?,
            "--cores" => machine.cores_per_cpu = value("--cores")?.parse().context("bad --cores")?,
            "--threads" => {
                machine.threads_per_core = value("--threads")?.parse().context("bad --threads")?
            }
            "--clock" => machine.clock_rate = value("--clock")?.parse().context("bad --clock")?,
            "--scheduler-rate" => {
                machine.scheduler_rate = value("--scheduler-rate")?
                    .parse()
                    .context("bad --scheduler-rate")?
            }
            "--generator-rate" => {
                machine.generator_rate = value("--generator-rate")?
                    .parse()
                    .context("bad --generator-rate")?
            }
            "--quantum" => {
                machine.quantum_ms = value("--quantum")?.parse().context("bad --quantum")?
            }
            "--max-pulses" => {
                max_pulses = Some(value("--max-pulses")?.parse().context("bad --max-pulses")?)
            }
            "--dump-dir" => dump_dir = Some(value("--dump-dir")?.into()),
            _ if arg.starts_with('-') => {
                bail!("unknown option: {}\nUse --help for usage information", arg)
            }
            _ => programs.push(arg.clone()),
        }
    }

    if programs.is_empty() {
        print_help(program);
        bail!("\nError: expected at least one program image");
    }

    Ok(CliConfig {
        machine,
        max_pulses,
        dump_dir,
        programs,
        verbose,
    })
}

fn run(config: &CliConfig) -> Result<()> {
    // A malformed image rejects that load only; the rest still run.
    let mut images = Vec::new();
    for path in &config.programs {
        match ProgramImage::from_file(path) {
            Ok(image) => images.push(image),
            Err(e) => warn!("skipping {}: {:#}", path, e),
        }
    }
    if images.is_empty() {
        bail!("no loadable program images");
    }

    let kernel = Kernel::new(
        config.machine,
        config.dump_dir.clone(),
        config.max_pulses,
    )?;
    let report = kernel.run(images)?;
    println!("{}", report);
    Ok(())
}
