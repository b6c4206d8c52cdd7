//! Capture analysis CLI for qosnet experiments.
//!
//! Ingests a directory of capture summaries (or raw tcpdump text dumps),
//! aggregates them per protocol, capture point, host and service class, and
//! writes the run report without driving any workload.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use rayon::prelude::*;

use qosnet::analysis::print_summary;
use qosnet::capture::{capture_point_from_filename, render, summarize_tcpdump, SUMMARY_EXTENSION};
use qosnet::config_loader;
use qosnet::experiment::{ExperimentRunner, RoutingMode, RunOptions};

#[derive(Parser)]
#[command(name = "capture-analyzer")]
#[command(about = "Traffic statistics from qosnet capture summaries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Experiment configuration (address space and service classes)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a capture directory and write the run report
    Analyze {
        /// Directory holding `*.summary` capture files
        #[arg(long)]
        captures: PathBuf,

        /// Results directory; the report lands in `<results>/<run-id>/`
        #[arg(long, default_value = "results")]
        results: PathBuf,

        /// Run identifier (derived from --qos/--routing if omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Whether shaping was active during the capture
        #[arg(long)]
        qos: bool,

        /// Routing mode in force during the capture
        #[arg(long, value_enum, default_value_t = RoutingMode::None)]
        routing: RoutingMode,

        /// Capture window in seconds
        #[arg(long, default_value = "0")]
        duration: u64,
    },

    /// Convert `tcpdump -nn -r` text dumps to capture summaries
    Convert {
        /// Directory of `<point>_*.txt` dumps
        #[arg(long)]
        input: PathBuf,

        /// Directory to write the summaries into
        #[arg(long)]
        output: PathBuf,
    },
}

/// Convert every `.txt` dump in `input`, returning the written summaries
fn convert_dumps(input: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    let mut dumps: Vec<PathBuf> = fs::read_dir(input)
        .with_context(|| format!("Failed to read dump directory {}", input.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    dumps.sort();

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    dumps
        .par_iter()
        .map(|dump| -> Result<PathBuf> {
            let point = capture_point_from_filename(dump)?;
            let text = fs::read_to_string(dump)
                .with_context(|| format!("Failed to read dump {}", dump.display()))?;
            let record = summarize_tcpdump(&text, &point);
            let path = output.join(dump.with_extension(SUMMARY_EXTENSION).file_name().unwrap_or_default());
            fs::write(&path, render(&record))
                .with_context(|| format!("Failed to write summary {}", path.display()))?;
            log::info!("{} -> {} ({} frames)", dump.display(), path.display(), record.total);
            Ok(path)
        })
        .collect()
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Analyze {
            captures,
            results,
            run_id,
            qos,
            routing,
            duration,
        } => {
            let mut config = config_loader::load_or_reference(cli.config.as_deref())?;
            config.general.results_dir = results;

            let options = RunOptions {
                qos,
                routing,
                duration: Duration::from_secs(duration),
            };
            let run_id = run_id.unwrap_or_else(|| options.run_id());
            let runner = ExperimentRunner::new(config);
            let outcome = runner.analyze_captures(&captures, &run_id, options)?;

            print_summary(&outcome.report);
            println!("\nReports written to: {}", outcome.artifacts.run_dir.display());
        }
        Commands::Convert { input, output } => {
            let written = convert_dumps(&input, &output)?;
            log::info!("Converted {} dumps into {}", written.len(), output.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_args() {
        let cli = Cli::parse_from([
            "capture-analyzer",
            "analyze",
            "--captures",
            "caps",
            "--results",
            "out",
            "--run-id",
            "baseline",
        ]);
        match cli.command {
            Commands::Analyze {
                captures,
                results,
                run_id,
                qos,
                ..
            } => {
                assert_eq!(captures, PathBuf::from("caps"));
                assert_eq!(results, PathBuf::from("out"));
                assert_eq!(run_id.as_deref(), Some("baseline"));
                assert!(!qos);
            }
            Commands::Convert { .. } => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_convert_dumps() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(
            input.path().join("s2_capture.txt"),
            "12:00:00.000001 IP 10.0.0.3.5000 > 10.0.0.4.6000: UDP, length 1200\n\
             12:00:00.000002 IP 10.0.0.1.80 > 10.0.0.2.4000: Flags [P.], seq 1:10, length 9\n",
        )
        .unwrap();
        fs::write(input.path().join("notes.md"), "ignored").unwrap();

        let written = convert_dumps(input.path(), output.path()).unwrap();
        assert_eq!(written.len(), 1);
        let name = written[0].file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name, "s2_capture.summary");
        let text = fs::read_to_string(&written[0]).unwrap();
        assert!(text.contains("total 2"));
        assert!(text.contains("proto UDP 1"));
        assert!(text.contains("proto TCP 1"));
    }
}
