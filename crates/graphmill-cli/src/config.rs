use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use graphmill::{Config, ErrorPolicy, Phase, config::keys};

use crate::telemetry::LogFormat;

fn parse_define(raw: &str) -> graphmill::Result<(String, String)> {
    Config::parse_assignment(raw)
}

/// Command line configuration for the `graphmill` binary.
///
/// Every option can also be set through the environment variable named next
/// to it; a `.env` file in the working directory is loaded first. Anything
/// without a dedicated option is set with `-D key=value`.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "graphmill",
    version,
    about = "Runs a two-phase graph migration"
)]
pub struct CliArgs {
    /// Phases to run, in order.
    ///
    /// Each phase is waited for and closed before the next one starts.
    ///
    /// Environment variable: `GRAPHMILL_PHASES`
    #[arg(
        long,
        env = "GRAPHMILL_PHASES",
        value_delimiter = ',',
        default_value = "one,two"
    )]
    pub phases: Vec<Phase>,

    /// Number of pipelines per phase, and of worker threads.
    ///
    /// Defaults to the number of CPUs.
    ///
    /// Environment variable: `GRAPHMILL_PARALLELISM`
    #[arg(short, long, env = "GRAPHMILL_PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Work chunk driver (`range`, `directory`).
    ///
    /// Environment variable: `GRAPHMILL_WORK_DRIVER`
    #[arg(long, env = "GRAPHMILL_WORK_DRIVER")]
    pub work_driver: Option<String>,

    /// Exclusive upper bound of the `range` driver.
    ///
    /// Environment variable: `GRAPHMILL_RANGE_TOP`
    #[arg(long, env = "GRAPHMILL_RANGE_TOP")]
    pub top: Option<u64>,

    /// Work items per chunk of the `range` driver.
    ///
    /// Environment variable: `GRAPHMILL_BATCH_SIZE`
    #[arg(long, env = "GRAPHMILL_BATCH_SIZE")]
    pub batch_size: Option<u64>,

    /// Directory read by the `directory` driver.
    ///
    /// Environment variable: `GRAPHMILL_INPUT`
    #[arg(long, env = "GRAPHMILL_INPUT")]
    pub input: Option<PathBuf>,

    /// Output ID driver (`ranged`, `generated`, `passthrough`).
    ///
    /// Environment variable: `GRAPHMILL_ID_DRIVER`
    #[arg(long, env = "GRAPHMILL_ID_DRIVER")]
    pub id_driver: Option<String>,

    /// Emitter reading the source (`synthetic`, `jsonl`).
    ///
    /// Environment variable: `GRAPHMILL_EMITTER`
    #[arg(long, env = "GRAPHMILL_EMITTER")]
    pub emitter: Option<String>,

    /// Output writing the sink (`memory`, `jsonl`).
    ///
    /// Environment variable: `GRAPHMILL_OUTPUT`
    #[arg(long, env = "GRAPHMILL_OUTPUT")]
    pub output: Option<String>,

    /// Root directory of the `jsonl` output.
    ///
    /// Environment variable: `GRAPHMILL_OUTPUT_PATH`
    #[arg(long, env = "GRAPHMILL_OUTPUT_PATH")]
    pub output_path: Option<PathBuf>,

    /// Remove whatever the output already holds before each phase starts.
    #[arg(long, default_value_t = false)]
    pub drop_storage: bool,

    /// What to do when an element fails (`continue`, `abort`).
    ///
    /// Environment variable: `GRAPHMILL_ON_ERROR`
    #[arg(long, env = "GRAPHMILL_ON_ERROR")]
    pub on_error: Option<ErrorPolicy>,

    /// Raw configuration assignment, e.g. `-D phase.two.synthetic.edge.fanout=3`.
    ///
    /// Applied after every other option, so it wins on conflicts.
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = parse_define)]
    pub defines: Vec<(String, String)>,

    /// Log line format.
    ///
    /// Environment variable: `GRAPHMILL_LOG_FORMAT`
    #[arg(long, env = "GRAPHMILL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub phases: Vec<Phase>,
    pub config: Config,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.phases.is_empty() {
            bail!("GRAPHMILL_PHASES must name at least one phase");
        }
        if let Some((i, phase)) = args
            .phases
            .iter()
            .enumerate()
            .find(|(i, phase)| args.phases[..*i].contains(*phase))
        {
            bail!("Phase {phase} is requested twice (position {})", i + 1);
        }
        if args.parallelism == Some(0) {
            bail!("GRAPHMILL_PARALLELISM must be greater than 0");
        }

        let mut config = Config::new();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                config.set(key, value);
            }
        };
        set(keys::PARALLELISM, args.parallelism.map(|n| n.to_string()));
        set(keys::WORK_DRIVER, args.work_driver);
        set(keys::WORK_RANGE_TOP, args.top.map(|n| n.to_string()));
        set(keys::WORK_BATCH_SIZE, args.batch_size.map(|n| n.to_string()));
        set(
            keys::WORK_DIRECTORY_PATH,
            args.input.map(|p| p.display().to_string()),
        );
        set(keys::ID_DRIVER, args.id_driver);
        set(keys::EMITTER, args.emitter);
        set(keys::OUTPUT, args.output);
        set(
            keys::OUTPUT_JSONL_PATH,
            args.output_path.map(|p| p.display().to_string()),
        );
        set(keys::ON_ERROR, args.on_error.map(|p| p.to_string()));
        if args.drop_storage {
            config.set(keys::OUTPUT_DROP_STORAGE, true);
        }
        for (key, value) in args.defines {
            config.set(key, value);
        }

        Ok(Self {
            phases: args.phases,
            config,
            log_format: args.log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_config(args: &[&str]) -> anyhow::Result<RunConfig> {
        let args = CliArgs::try_parse_from(core::iter::once("graphmill").chain(args.iter().copied()))?;
        RunConfig::try_from(args)
    }

    #[test]
    fn options_become_config_keys() {
        let run = run_config(&[
            "--phases",
            "two",
            "-p",
            "3",
            "--top",
            "50",
            "--output",
            "jsonl",
            "--output-path",
            "/tmp/out",
            "--on-error",
            "abort",
            "--drop-storage",
        ])
        .unwrap();

        assert_eq!(run.phases, vec![Phase::Two]);
        assert_eq!(run.config.get(keys::PARALLELISM), Some("3"));
        assert_eq!(run.config.get(keys::WORK_RANGE_TOP), Some("50"));
        assert_eq!(run.config.get(keys::OUTPUT), Some("jsonl"));
        assert_eq!(run.config.get(keys::OUTPUT_JSONL_PATH), Some("/tmp/out"));
        assert_eq!(run.config.get(keys::ON_ERROR), Some("abort"));
        assert_eq!(run.config.get(keys::OUTPUT_DROP_STORAGE), Some("true"));
        assert!(!run.config.contains(keys::EMITTER));
    }

    #[test]
    fn defines_win_over_options() {
        let run = run_config(&[
            "--top",
            "50",
            "-D",
            "work.range.top=70",
            "--define",
            "phase.two.synthetic.edge.fanout=3",
        ])
        .unwrap();

        assert_eq!(run.phases, vec![Phase::One, Phase::Two]);
        assert_eq!(run.config.get(keys::WORK_RANGE_TOP), Some("70"));
        assert_eq!(
            run.config.for_phase(Phase::Two).get(keys::SYNTHETIC_EDGE_FANOUT),
            Some("3")
        );
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        assert!(run_config(&["--phases", "one,one"]).is_err());
        assert!(run_config(&["--phases", "three"]).is_err());
        assert!(run_config(&["-p", "0"]).is_err());
        assert!(run_config(&["-D", "novalue"]).is_err());
        assert!(run_config(&["--on-error", "retry"]).is_err());
    }
}
