use anyhow::Result;
use clap::Parser;
use orion::algorithm::OutputFormat;
use orion::cli::{Cli, CmdArgs, Command};
use orion::config::OrionConfig;
use orion::run_test::{Report, TestRunner};
use orion::source::JsonDirSource;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when any test regressed
const EXIT_REGRESSION: u8 = 2;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_report(report: &Report, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
        OutputFormat::Text => {
            for (name, test) in report.entries() {
                println!("{}", name);
                println!("{}", "=".repeat(name.chars().count()));
                println!("{}", test.output);
            }
        }
    }
    Ok(())
}

fn run_cmd(args: &CmdArgs) -> Result<bool> {
    let config = OrionConfig::from_toml(&args.config)?;
    let options = args.to_options(config.tuning());
    let source = JsonDirSource::new();

    let report = TestRunner::new(&config, &options, &source).run()?;
    print_report(&report, options.output_format)?;
    Ok(report.has_regression())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Cmd(args) => {
            init_tracing(args.debug);
            run_cmd(args)
        }
    };

    match result {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(EXIT_REGRESSION),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
