use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use qosnet::analysis::print_summary;
use qosnet::config::Config;
use qosnet::config_loader;
use qosnet::experiment::{ExperimentRunner, RoutingMode, RunOptions};
use qosnet::utils::format_rate;

/// Multi-service network QoS experiment driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the experiment configuration YAML file (reference experiment if omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Run a single experiment
    Single {
        /// Enable QoS shaping
        #[arg(long)]
        qos: bool,

        /// Routing mode
        #[arg(long, value_enum, default_value_t = RoutingMode::None)]
        routing: RoutingMode,

        /// Run duration in seconds (configured duration if omitted)
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Run all four QoS/routing combinations
    All {
        /// Duration of each run in seconds (configured duration if omitted)
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Short run with QoS and static routing
    Demo,

    /// Print the shaping plan and its tc commands without running
    Plan,

    /// Write the reference experiment configuration
    Init {
        /// Output path for the configuration
        #[arg(default_value = "experiment.yaml")]
        output: PathBuf,
    },
}

/// Requested run window, rejected when it cannot be scaled to wall-clock time
fn run_duration(config: &Config, seconds: Option<u64>) -> Result<Duration> {
    let duration = seconds.map(Duration::from_secs).unwrap_or(config.general.duration);
    config.general.wall_clock_window(duration)?;
    Ok(duration)
}

fn print_plan(runner: &ExperimentRunner) -> Result<()> {
    let plan = runner.plan()?;
    let commands = runner.plan_commands()?;

    println!("\n=== SHAPING PLAN ===\n");
    for (attachment, tree) in &plan.trees {
        println!("{} ({}):", attachment, tree.interface());
        for leaf in tree.leaves() {
            let service = leaf.service.as_ref().map(|s| s.as_str()).unwrap_or("-");
            println!(
                "  {} {:<10} floor {:>10} ceil {:>10} prio {}",
                leaf.class_id,
                service,
                leaf.floor.map(format_rate).unwrap_or_else(|| "-".to_string()),
                format_rate(leaf.ceiling),
                leaf.priority.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            );
        }
        for command in commands.get(attachment).into_iter().flatten() {
            println!("    {}", command);
        }
    }

    if !plan.failures.is_empty() {
        println!("\nFailures:");
        for (attachment, error) in &plan.failures {
            println!("  {}: {}", attachment, error);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    let config_path = args.config.as_deref();
    match args.command {
        Command::Single {
            qos,
            routing,
            duration,
        } => {
            let runner = ExperimentRunner::new(config_loader::load_or_reference(config_path)?);
            let options = RunOptions {
                qos,
                routing,
                duration: run_duration(runner.config(), duration)?,
            };
            let outcome = runner.run_single(options)?;
            print_summary(&outcome.report);
        }
        Command::All { duration } => {
            let runner = ExperimentRunner::new(config_loader::load_or_reference(config_path)?);
            let entries = runner.run_all(run_duration(runner.config(), duration)?)?;
            let failed = entries.iter().filter(|e| e.error.is_some()).count();
            info!(
                "All experiments completed: {} succeeded, {} failed",
                entries.len() - failed,
                failed
            );
        }
        Command::Demo => {
            let runner = ExperimentRunner::new(config_loader::load_or_reference(config_path)?);
            info!("Running demo: QoS enabled, static routing");
            let outcome = runner.run_demo()?;
            print_summary(&outcome.report);
        }
        Command::Plan => {
            let runner = ExperimentRunner::new(config_loader::load_or_reference(config_path)?);
            print_plan(&runner)?;
        }
        Command::Init { output } => {
            let config = Config::reference().wrap_err("Failed to build reference configuration")?;
            config_loader::write_config(&config, &output)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_parsing() {
        let args = Args::parse_from([
            "qosnet",
            "--config",
            "experiment.yaml",
            "single",
            "--qos",
            "--routing",
            "static",
            "--duration",
            "30",
        ]);

        assert_eq!(args.config, Some(PathBuf::from("experiment.yaml")));
        assert_eq!(args.log_level, "info");
        assert_eq!(
            args.command,
            Command::Single {
                qos: true,
                routing: RoutingMode::Static,
                duration: Some(30),
            }
        );
    }

    #[test]
    fn test_single_defaults() {
        let args = Args::parse_from(["qosnet", "single"]);
        assert_eq!(args.config, None);
        assert_eq!(
            args.command,
            Command::Single {
                qos: false,
                routing: RoutingMode::None,
                duration: None,
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["qosnet", "all", "--duration", "120", "--log-level", "debug"]);
        assert_eq!(args.log_level, "debug");
        assert_eq!(args.command, Command::All { duration: Some(120) });
    }

    #[test]
    fn test_duration_falls_back_to_config() {
        let config = Config::reference().unwrap();
        assert_eq!(run_duration(&config, None).unwrap(), config.general.duration);
        assert_eq!(run_duration(&config, Some(5)).unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        let args = Args::parse_from(["qosnet", "single", "--duration", "18446744073709551615"]);
        let Command::Single { duration, .. } = args.command else {
            panic!("expected the single subcommand");
        };
        let config = Config::reference().unwrap();
        let err = run_duration(&config, duration).unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{}", err);
        assert!(run_duration(&config, Some(0)).is_err());
    }

    #[test]
    fn test_unknown_routing_rejected() {
        assert!(Args::try_parse_from(["qosnet", "single", "--routing", "ospf"]).is_err());
    }
}
