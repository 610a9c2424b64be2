//! babelsub - multilingual burned-in subtitles for uploaded videos
//!
//! Extracts the audio, transcribes it, detects the spoken language, translates
//! the subtitles and renders one subtitled video per language with ffmpeg.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use babelsub::cli::{Args, Commands};
use babelsub::config::Config;
use babelsub::job::JobReport;
use babelsub::language::{LanguageCatalog, LanguageCode, LanguageLookup};
use babelsub::workflow::{self, Workflow};

const DEFAULT_CONFIG_FILE: &str = "babelsub.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;
    dotenvy::dotenv().ok();

    let mut config = load_config(args.config.as_deref())?;
    let cancel = cancel_on_ctrl_c();

    match args.command {
        Commands::Process {
            input,
            target_langs,
            output_dir,
            report,
        } => {
            let targets = LanguageCode::parse_list(&target_langs)?;
            if let Some(dir) = output_dir {
                config.pipeline.output_dir = dir;
            }

            let spinner = job_spinner();
            let observer = spinner.clone();
            let workflow = Workflow::new(config)?.with_observer(move |state| {
                observer.set_message(state.to_string());
            });
            workflow.check_dependencies().await?;

            let result = workflow.process(&input, &targets, cancel).await;
            spinner.finish_and_clear();
            let job_report = result?;

            print_report(&job_report);
            if let Some(path) = report {
                write_report(&job_report, &path)?;
            }
        }
        Commands::Batch {
            input_dir,
            target_langs,
            output_dir,
        } => {
            let targets = LanguageCode::parse_list(&target_langs)?;
            if let Some(dir) = output_dir {
                config.pipeline.output_dir = dir;
            }

            let workflow = Workflow::new(config)?;
            workflow.check_dependencies().await?;
            let results = workflow
                .process_directory(&input_dir, &targets, cancel)
                .await?;

            println!("\n{:<50} {:<10} {:<30}", "Video", "Result", "Details");
            println!("{}", "-".repeat(90));
            for (video, result) in &results {
                let name = video.file_name().unwrap_or_default().to_string_lossy();
                match result {
                    Ok(report) => println!(
                        "{:<50} {:<10} {} artifacts, {} failed",
                        name,
                        if report.is_complete() { "ok" } else { "partial" },
                        report.artifacts.len(),
                        report.failures.len()
                    ),
                    Err(e) => println!("{:<50} {:<10} {}", name, "failed", e),
                }
            }
        }
        Commands::Extract { input, output } => {
            info!("Extracting audio from: {}", input.display());
            let audio = workflow::extract_audio(&config, &input, output.as_deref(), cancel).await?;
            println!("{}", audio.display());
        }
        Commands::Transcribe { input, output } => {
            info!("Transcribing audio: {}", input.display());
            let track = workflow::transcribe_file(&config, &input, &output, cancel).await?;
            println!("Wrote {} cues to {}", track.len(), output.display());
        }
        Commands::Detect { input } => {
            let language = workflow::detect_file_language(&config, &input).await?;
            println!("{} {} ({})", language.flag, language.name, language.code);
        }
        Commands::Translate {
            input,
            output,
            target_lang,
        } => {
            info!("Translating subtitles: {}", input.display());
            let target = LanguageCode::new(&target_lang)?;
            let track = workflow::translate_file(&config, &input, &output, &target, cancel).await?;
            println!("Wrote {} translated cues to {}", track.len(), output.display());
        }
        Commands::Burn {
            video,
            subtitles,
            language,
            output_dir,
        } => {
            info!("Burning subtitles into video: {}", video.display());
            let language = LanguageCode::new(&language)?;
            let output_dir = output_dir.unwrap_or_else(|| config.pipeline.output_dir.clone());
            let output = workflow::burn_subtitle_file(
                &config,
                &video,
                &subtitles,
                &language,
                &output_dir,
                cancel,
            )
            .await?;
            println!("{}", output.display());
        }
        Commands::Languages => {
            println!("{:<6} {:<5} {:<20}", "Code", "Flag", "Name");
            println!("{}", "-".repeat(31));
            for language in LanguageCatalog.all() {
                println!("{:<6} {:<5} {:<20}", language.code, language.flag, language.name);
            }
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
            }
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

/// `--config`, then `./babelsub.toml`, then built-in defaults.
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = match explicit {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
            Config::from_file(DEFAULT_CONFIG_FILE)?
        }
        None => Config::default(),
    };
    Ok(config)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running job");
            token.cancel();
        }
    });
    cancel
}

fn job_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn print_report(report: &JobReport) {
    println!(
        "\nJob {}: original language {} {}",
        report.job_id, report.original_language_flag, report.original_language_name
    );
    println!("{:<6} {:<20} {:<60}", "Code", "Language", "Video / Failure");
    println!("{}", "-".repeat(86));
    for (code, artifact) in &report.artifacts {
        println!(
            "{:<6} {:<20} {:<60}",
            code.as_str(),
            format!("{} {}", artifact.flag, artifact.name),
            artifact.video.display()
        );
    }
    for (code, failure) in &report.failures {
        let name = LanguageCatalog
            .info(code)
            .map(|info| JobReport::describe_language(&info))
            .unwrap_or_else(|_| code.to_string());
        println!(
            "{:<6} {:<20} failed during {}: {}",
            code.as_str(),
            name,
            failure.stage,
            failure.reason
        );
    }
}

fn write_report(report: &JobReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".babelsub").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "babelsub.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("babelsub.log").display()
    );
    Ok(())
}
