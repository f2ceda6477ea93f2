//! Labrun CLI
//!
//! Run a source file through the execution engine, optionally grading it
//! against a JSON file of test cases.

use anyhow::{bail, Context};
use console::style;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use labrun::{Dispatcher, EngineConfig, ExecutionResult, Language, TestCase};

/// What the user asked for
#[derive(Debug)]
enum Command {
    Run(RunArgs),
    Languages,
    Help,
}

#[derive(Debug, Default)]
struct RunArgs {
    file: Option<PathBuf>,
    language: Option<String>,
    tests: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
}

fn parse_args() -> anyhow::Result<(Command, Option<PathBuf>)> {
    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        return Ok((Command::Help, None));
    };

    let mut run = RunArgs::default();
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--lang" | "-l" => {
                i += 1;
                run.language = args.get(i).cloned();
            }
            "--tests" | "-t" => {
                i += 1;
                run.tests = args.get(i).map(PathBuf::from);
            }
            "--config" | "-c" => {
                i += 1;
                run.config = args.get(i).map(PathBuf::from);
            }
            "--json" => run.json = true,
            "--help" | "-h" => return Ok((Command::Help, None)),
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            other => {
                if run.file.is_some() {
                    bail!("unexpected argument: {other}");
                }
                run.file = Some(PathBuf::from(other));
            }
        }
        i += 1;
    }

    let config = run.config.clone();
    let command = match command.as_str() {
        "run" => Command::Run(run),
        "languages" | "langs" => Command::Languages,
        "help" | "--help" | "-h" => Command::Help,
        other => bail!("unknown command: {other} (try `labrun help`)"),
    };
    Ok((command, config))
}

fn print_help() {
    println!("Labrun v{}", labrun::VERSION);
    println!();
    println!("USAGE:");
    println!("    labrun run <FILE> [OPTIONS]");
    println!("    labrun languages");
    println!("    labrun help");
    println!();
    println!("OPTIONS:");
    println!("    -l, --lang <LANG>       Language (default: from file extension)");
    println!("    -t, --tests <FILE>      JSON array of test cases to grade against");
    println!("    -c, --config <FILE>     Engine config (default: <config dir>/labrun/config.json)");
    println!("        --json              Print the raw result as JSON");
    println!("    -h, --help              Print help");
    println!();
    println!("ENVIRONMENT:");
    println!("    LABRUN_TIMEOUT_MS       Execution timeout in milliseconds");
    println!("    LABRUN_MATCH            Output comparison: exact | trim-end");
    println!("    LABRUN_PYTHON           Python interpreter (enables subprocess mode)");
    println!("    RUST_LOG                Log filter (default: warn)");
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::discover(path)?;
    config.apply_env()?;
    debug!("engine config: {:?}", config);
    Ok(config)
}

fn load_tests(path: &Path) -> anyhow::Result<Vec<TestCase>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tests {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid tests file {}", path.display()))
}

fn resolve_language(args: &RunArgs, file: &Path) -> anyhow::Result<String> {
    if let Some(language) = &args.language {
        return Ok(language.clone());
    }
    file.extension()
        .and_then(|ext| ext.to_str())
        .and_then(Language::from_extension)
        .map(|lang| lang.name().to_string())
        .with_context(|| format!("cannot infer language of {}; pass --lang", file.display()))
}

fn print_result(result: &ExecutionResult) {
    match &result.test_results {
        Some(cases) if !cases.is_empty() => {
            for line in result.output.lines() {
                if line.ends_with("PASSED") {
                    println!("{}", style(line).green());
                } else if line.ends_with("FAILED") {
                    println!("{}", style(line).red());
                } else {
                    println!("{line}");
                }
            }
        }
        _ => println!("{}", result.display_text()),
    }

    println!();
    if result.passed {
        println!("{} ({}ms)", style("PASSED").green().bold(), result.execution_time_ms);
    } else {
        println!("{} ({}ms)", style("FAILED").red().bold(), result.execution_time_ms);
        if let Some(error) = &result.error {
            eprintln!("{} {}", style("error:").red(), error);
        }
    }
}

async fn run(args: RunArgs, config: EngineConfig) -> anyhow::Result<bool> {
    let Some(file) = args.file.clone() else {
        bail!("missing <FILE> (try `labrun help`)");
    };
    let code = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let language = resolve_language(&args, &file)?;
    let tests = args.tests.as_deref().map(load_tests).transpose()?;

    let dispatcher = Dispatcher::new(&config);
    let result = dispatcher.execute_code(code, language, tests).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(result.passed)
}

fn list_languages(config: &EngineConfig) {
    let dispatcher = Dispatcher::new(config);
    for check in dispatcher.capabilities() {
        println!("{check}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (command, config_path) = parse_args()?;

    match command {
        Command::Help => print_help(),
        Command::Languages => list_languages(&load_config(config_path.as_deref())?),
        Command::Run(args) => {
            let config = load_config(config_path.as_deref())?;
            if !run(args, config).await? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
