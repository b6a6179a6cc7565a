//! CLI argument parsing for Orion

use crate::algorithm::{AlgorithmKind, OutputFormat};
use crate::config::{DetectorTuning, Options};
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "orion")]
#[command(version)]
#[command(about = "Regression and anomaly detection over benchmark run history", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze every configured test and report regressions
    Cmd(CmdArgs),
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("algorithm")
        .required(true)
        .args(["hunter_analyze", "anomaly_detection"])
))]
pub struct CmdArgs {
    /// Path to the TOML test configuration
    #[arg(long = "config", value_name = "PATH", default_value = "config.toml")]
    pub config: PathBuf,

    /// Run change-point detection
    #[arg(long = "hunter-analyze")]
    pub hunter_analyze: bool,

    /// Run isolation-forest anomaly detection
    #[arg(long = "anomaly-detection")]
    pub anomaly_detection: bool,

    /// Runs in the trailing moving average (default: 5)
    #[arg(long = "anomaly-window", value_name = "RUNS", requires = "anomaly_detection")]
    pub anomaly_window: Option<usize>,

    /// Minimum deviation in percent for a run to be flagged (default: 10)
    #[arg(
        long = "min-anomaly-percent",
        value_name = "PERCENT",
        requires = "anomaly_detection"
    )]
    pub min_anomaly_percent: Option<f64>,

    /// Only consider runs from the last N days (e.g. 15 or 15d)
    #[arg(long = "lookback", value_name = "DAYS", value_parser = parse_lookback)]
    pub lookback: Option<u32>,

    /// Output format (text or json)
    #[arg(short = 'o', long = "output-format", value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Run to compare against its history or baseline
    #[arg(long = "uuid", value_name = "UUID")]
    pub uuid: Option<String>,

    /// Comma-separated baseline run identifiers
    #[arg(long = "baseline", value_name = "UUIDS", value_delimiter = ',')]
    pub baseline: Vec<String>,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl CmdArgs {
    pub fn kind(&self) -> AlgorithmKind {
        if self.anomaly_detection {
            AlgorithmKind::Anomaly
        } else {
            AlgorithmKind::ChangePoint
        }
    }

    pub fn to_options(&self, tuning: DetectorTuning) -> Options {
        let mut options = Options::new(self.kind());
        options.lookback_days = self.lookback;
        options.output_format = self.output_format;
        options.uuid = self.uuid.clone();
        options.baseline = self
            .baseline
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        options.tuning = tuning;
        if let Some(window) = self.anomaly_window {
            options.anomaly_window = window;
        }
        if let Some(percent) = self.min_anomaly_percent {
            options.min_anomaly_percent = percent;
        }
        options
    }
}

/// Parse a lookback of whole days, with or without a trailing `d`
fn parse_lookback(value: &str) -> Result<u32, String> {
    let trimmed = value.trim();
    let days = trimmed.strip_suffix(['d', 'D']).unwrap_or(trimmed);
    days.parse::<u32>()
        .map_err(|_| format!("invalid lookback '{}' (expected days, e.g. 15 or 15d)", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(args: &[&str]) -> CmdArgs {
        let mut argv = vec!["orion", "cmd"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Command::Cmd(args) => args,
        }
    }

    #[test]
    fn test_cli_hunter_analyze() {
        let args = cmd(&["--hunter-analyze"]);
        assert_eq!(args.kind(), AlgorithmKind::ChangePoint);
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert!(!args.debug);
    }

    #[test]
    fn test_cli_anomaly_detection_options() {
        let args = cmd(&[
            "--anomaly-detection",
            "--anomaly-window",
            "8",
            "--min-anomaly-percent",
            "15",
        ]);
        let options = args.to_options(DetectorTuning::default());
        assert_eq!(options.kind, AlgorithmKind::Anomaly);
        assert_eq!(options.anomaly_window, 8);
        assert_eq!(options.min_anomaly_percent, 15.0);
    }

    #[test]
    fn test_cli_anomaly_defaults() {
        let options = cmd(&["--anomaly-detection"]).to_options(DetectorTuning::default());
        assert_eq!(options.anomaly_window, Options::DEFAULT_ANOMALY_WINDOW);
        assert_eq!(options.min_anomaly_percent, Options::DEFAULT_MIN_ANOMALY_PERCENT);
    }

    #[test]
    fn test_cli_detectors_mutually_exclusive() {
        let result = Cli::try_parse_from([
            "orion",
            "cmd",
            "--hunter-analyze",
            "--anomaly-detection",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_detector_required() {
        assert!(Cli::try_parse_from(["orion", "cmd"]).is_err());
    }

    #[test]
    fn test_cli_anomaly_window_requires_anomaly_detection() {
        let result = Cli::try_parse_from([
            "orion",
            "cmd",
            "--hunter-analyze",
            "--anomaly-window",
            "3",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_lookback_formats() {
        assert_eq!(cmd(&["--hunter-analyze", "--lookback", "15d"]).lookback, Some(15));
        assert_eq!(cmd(&["--hunter-analyze", "--lookback", "7"]).lookback, Some(7));
        assert!(parse_lookback("two weeks").is_err());
        assert!(parse_lookback("-3d").is_err());
    }

    #[test]
    fn test_cli_baseline_and_output() {
        let args = cmd(&[
            "--hunter-analyze",
            "--baseline",
            "a,b, c",
            "--uuid",
            "z",
            "-o",
            "json",
        ]);
        let options = args.to_options(DetectorTuning::default());
        assert_eq!(options.baseline, vec!["a", "b", "c"]);
        assert_eq!(options.uuid.as_deref(), Some("z"));
        assert_eq!(options.output_format, OutputFormat::Json);
    }
}
