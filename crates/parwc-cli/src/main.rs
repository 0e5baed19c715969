//! parwc CLI entry point.
//!
//! Usage:
//!   parwc [OPTIONS] <file>     # Count words in <file> across parallel branches
//!   parwc stage <name>         # Stage host: run one embedded filter, stdin → stdout
//!   parwc merge-sum            # Sum (count, key) records from stdin
//!   parwc --list-stages        # List registered stages

use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use parwc_kernel::{CountTable, StageRegistry, Topology, TopologyConfig};
use tokio::io::BufReader;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // stdout carries data in every mode, so logs go to stderr (RUST_LOG)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            eprintln!("Missing input file.");
            eprintln!("Run 'parwc --help' for usage.");
            Ok(ExitCode::FAILURE)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("parwc {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("--list-stages") => {
            for (name, description) in StageRegistry::with_defaults().describe() {
                println!("{name:<20} {description}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Some("stage") => {
            let name = args.get(2).context("stage requires a stage name")?;
            run_stage(name)
        }

        Some("merge-sum") => run_merge_sum(),

        Some(_) => {
            let options = RunOptions::parse(&args[1..])?;
            run_topology(options)
        }
    }
}

fn print_help() {
    println!(
        r#"parwc v{}

Count word frequencies by running a filter pipeline over K parallel branches
and merging their partial counts.

Usage:
  parwc [OPTIONS] <file>       Run the topology over <file>
  parwc stage <name>           Run one embedded stage (stdin → stdout)
  parwc merge-sum              Sum (count, key) records from stdin
  parwc --list-stages          List registered stages

Options:
  -j, --fan-out <N>            Number of parallel branches (default: 2)
  --stages=<a,b,c>             Stage names, in order (default: word count)
  --system                     Use cat/tr/sort/uniq instead of embedded stages
  --single                     Run one branch with no router
  --report                     Print a JSON run report on stderr
  -h, --help                   Show this help
  -V, --version                Show version

Environment:
  RUST_LOG                     Log filter, e.g. RUST_LOG=parwc_kernel=debug

Examples:
  parwc book.txt
  parwc -j 8 --report book.txt
  parwc --system --fan-out=4 book.txt
  parwc --stages=noop,sort,count-runs words.txt
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Options for a topology run.
#[derive(Debug, Default, PartialEq, Eq)]
struct RunOptions {
    fan_out: Option<usize>,
    stages: Option<Vec<String>>,
    system: bool,
    single: bool,
    report: bool,
    input: Option<PathBuf>,
}

impl RunOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = RunOptions::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-j" | "--fan-out" => {
                    let value = iter.next().with_context(|| format!("{arg} requires a value"))?;
                    options.fan_out = Some(parse_fan_out(value)?);
                }
                "--system" => options.system = true,
                "--single" => options.single = true,
                "--report" => options.report = true,
                "--stages" => {
                    let value = iter.next().context("--stages requires a value")?;
                    options.stages = Some(parse_stage_list(value));
                }
                _ if arg.starts_with("--fan-out=") => {
                    options.fan_out = Some(parse_fan_out(&arg["--fan-out=".len()..])?);
                }
                _ if arg.starts_with("--stages=") => {
                    options.stages = Some(parse_stage_list(&arg["--stages=".len()..]));
                }
                _ if arg.starts_with("-j") && arg.len() > 2 => {
                    options.fan_out = Some(parse_fan_out(&arg[2..])?);
                }
                _ if arg.starts_with('-') => {
                    bail!("unknown option: {arg}");
                }
                path => {
                    if let Some(first) = &options.input {
                        bail!("only one input file is supported (got {} and {path})", first.display());
                    }
                    options.input = Some(PathBuf::from(path));
                }
            }
        }

        Ok(options)
    }

    fn config(&self) -> TopologyConfig {
        let mut config = if self.system {
            TopologyConfig::word_count_system()
        } else {
            TopologyConfig::word_count()
        };
        if let Some(fan_out) = self.fan_out {
            config = config.with_fan_out(fan_out);
        }
        if let Some(stages) = &self.stages {
            config = config.with_stages(stages.iter().cloned());
        }
        if self.single {
            config = config.with_fan_out(1);
        }
        config
    }
}

fn parse_fan_out(value: &str) -> Result<usize> {
    value
        .parse()
        .with_context(|| format!("invalid fan-out: {value}"))
}

fn parse_stage_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Build and run the topology, writing the merged counts to stdout.
fn run_topology(options: RunOptions) -> Result<ExitCode> {
    let input = options
        .input
        .clone()
        .context("missing input file (run 'parwc --help' for usage)")?;

    let config = options.config();
    let registry = StageRegistry::with_defaults();
    let topology = Topology::new(&config, &registry).context("invalid topology")?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt
        .block_on(async {
            let mut stdout = tokio::io::stdout();
            topology.run(&input, &mut stdout).await
        })
        .with_context(|| format!("failed to count {}", input.display()))?;

    if options.report {
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.fully_spawned() {
        Ok(ExitCode::SUCCESS)
    } else {
        for failure in &report.failed_branches {
            eprintln!("branch {} failed: {}", failure.branch, failure.error);
        }
        Ok(ExitCode::FAILURE)
    }
}

/// Run one embedded filter between this process's stdin and stdout.
fn run_stage(name: &str) -> Result<ExitCode> {
    let registry = StageRegistry::with_defaults();
    let Some(filter) = registry.filter(name) else {
        bail!("not an embedded stage: {name}");
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = rt.block_on(async {
        let mut input = BufReader::new(tokio::io::stdin());
        let mut output = tokio::io::stdout();
        filter.run(&mut input, &mut output).await
    });

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!(stage = name, "downstream closed");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).with_context(|| format!("stage {name} failed")),
    }
}

/// Sum `(count, key)` records from stdin into one table on stdout.
fn run_merge_sum() -> Result<ExitCode> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let mut table = CountTable::new();
        table
            .read_from(BufReader::new(tokio::io::stdin()))
            .await
            .context("failed to read records")?;
        table
            .write_to(&mut tokio::io::stdout())
            .await
            .context("failed to write counts")?;
        Ok(ExitCode::SUCCESS)
    })
}
