// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use cwhy::{
    CaptureRequest, Config, ContextBuilder, DiskSource, FixtureFilter, FixtureStore,
    PromptOptions, RegressionRunner, capture, render_prompt,
};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cwhy")]
#[command(about = "Explains compiler errors by bundling diagnostics with the source they point at", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Fixture store directory [env: CWHY_FIXTURES_DIR]
    #[arg(long, global = true, value_name = "DIR")]
    fixtures_dir: Option<PathBuf>,

    /// Lines of context on each side of a diagnostic [env: CWHY_CONTEXT_LINES]
    #[arg(long, global = true, value_name = "N")]
    context_lines: Option<usize>,

    /// Byte budget for all source excerpts [env: CWHY_BYTE_BUDGET]
    #[arg(long, global = true, value_name = "BYTES")]
    byte_budget: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the context bundle for compiler output and print it as a prompt
    Explain {
        /// File holding the compiler's stderr; reads stdin when omitted
        #[arg(long, value_name = "FILE")]
        stderr: Option<PathBuf>,

        /// Project root used to resolve relative paths
        #[arg(long, value_name = "DIR", default_value = ".")]
        root: PathBuf,

        /// Print the bundle as JSON instead of a prompt
        #[arg(long)]
        json: bool,
    },
    /// Record compiler output and the sources it references as a fixture
    Capture {
        /// Test case name
        #[arg(long)]
        name: String,

        /// Compiler name, e.g. g++ or clang++
        #[arg(long)]
        compiler: String,

        /// Compiler version, e.g. 9
        #[arg(long, value_name = "VERSION")]
        compiler_version: String,

        /// Operating system the output was produced on
        #[arg(long, default_value = std::env::consts::OS)]
        os: String,

        /// File holding the compiler's stderr
        #[arg(long, value_name = "FILE")]
        stderr: PathBuf,

        /// Project root used to resolve relative paths
        #[arg(long, value_name = "DIR", default_value = ".")]
        root: PathBuf,
    },
    /// Replay stored fixtures and report regressions
    Check {
        #[arg(long)]
        os: Option<String>,

        #[arg(long)]
        compiler: Option<String>,

        /// Worker threads [env: CWHY_JOBS]
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// List stored fixtures
    List {
        #[arg(long)]
        os: Option<String>,

        #[arg(long)]
        compiler: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut config = Config::from_env();
    if let Some(dir) = cli.fixtures_dir {
        config.fixtures_dir = dir;
    }
    if let Some(lines) = cli.context_lines {
        config.settings.context_lines = lines;
    }
    if let Some(budget) = cli.byte_budget {
        config.settings.byte_budget = budget;
    }

    match cli.command {
        Commands::Explain { stderr, root, json } => {
            let raw = read_stderr(stderr.as_deref())?;
            let report = ContextBuilder::new(config.settings).build(&raw, &DiskSource::new(&root));

            if json {
                println!("{}", serde_json::to_string_pretty(&report.bundle)?);
            } else {
                println!("{}", render_prompt(&report.bundle, &PromptOptions::default()));
            }
        }
        Commands::Capture {
            name,
            compiler,
            compiler_version,
            os,
            stderr,
            root,
        } => {
            let raw = read_stderr(Some(&stderr))?;
            let fixture = capture(&CaptureRequest {
                test_name: &name,
                os_name: &os,
                compiler_name: &compiler,
                compiler_version: &compiler_version,
                project_root: &root,
                raw_stderr: &raw,
                settings: config.settings,
            });

            let store = FixtureStore::new(&config.fixtures_dir);
            let dir = store
                .save(&fixture)
                .with_context(|| format!("Failed to save fixture {}", fixture.id))?;

            println!(
                "{} Captured {} ({} diagnostic(s), {} source file(s)) in {}",
                "==>".green(),
                fixture.id,
                fixture.expected_bundle.diagnostics.len(),
                fixture.source_files.len(),
                dir.display()
            );
        }
        Commands::Check { os, compiler, jobs } => {
            let store = FixtureStore::new(&config.fixtures_dir);
            let runner = RegressionRunner::new(jobs.unwrap_or(config.jobs));
            let filter = FixtureFilter { os, compiler };

            let results = runner
                .run_store(&store, &filter)
                .with_context(|| format!("Failed to read fixtures from {}", store.root().display()))?;

            if results.is_empty() {
                println!("{} No fixtures found in {}", "==>".green(), store.root().display());
                return Ok(());
            }

            for result in &results {
                if result.passed {
                    println!("{} {}", "PASS".green(), result.fixture_id);
                } else {
                    println!("{} {}", "FAIL".red().bold(), result.fixture_id);
                    for line in result.diff.to_string().lines() {
                        println!("    {}", line);
                    }
                }
            }

            let failed = results.iter().filter(|r| !r.passed).count();
            println!(
                "\n{} {} passed, {} failed",
                "==>".green(),
                results.len() - failed,
                failed
            );

            if failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::List { os, compiler } => {
            let store = FixtureStore::new(&config.fixtures_dir);
            let ids = store
                .ids(&FixtureFilter { os, compiler })
                .with_context(|| format!("Failed to read fixtures from {}", store.root().display()))?;

            for id in ids {
                println!("{}", id);
            }
        }
    }

    Ok(())
}

fn read_stderr(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display())),
        None => std::io::read_to_string(std::io::stdin()).context("Failed to read stdin"),
    }
}
