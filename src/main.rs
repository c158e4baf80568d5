use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::MultiProgress;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt2mp3::cli::{Cli, Commands};
use yt2mp3::config::Config;
use yt2mp3::metadata::OEmbedFetcher;
use yt2mp3::progress::{NoopProgress, ProgressSink, SuspendingWriter, TerminalProgress};
use yt2mp3::resolvers::{self, FallbackResolver, YoutubePageResolver, YtDlpResolver};
use yt2mp3::transcode::FfmpegEncoder;
use yt2mp3::transfer::HttpPayloadSource;
use yt2mp3::{utils, Pipeline, PipelineError, PipelineResult};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log lines go through the bar set so they never tear a bar mid-draw
    let multi = MultiProgress::new();

    // Initialize tracing
    let default_filter = if cli.verbose { "yt2mp3=debug" } else { "yt2mp3=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer({
            let multi = multi.clone();
            move || SuspendingWriter::new(multi.clone(), std::io::stderr())
        }))
        .init();

    let mut config = Config::load().await?;

    match cli.command {
        Commands::Convert {
            links,
            output_dir,
            jobs,
        } => {
            if let Some(dir) = output_dir {
                config.app.output_dir = Some(dir);
            }
            if let Some(jobs) = jobs {
                config.app.max_concurrent_tasks = jobs;
            }

            // Check for required external dependencies (non-fatal)
            let yt_dlp = config.resolver.yt_dlp_fallback.then_some(config.resolver.yt_dlp_path.as_str());
            let missing_deps = utils::check_dependencies(&config.encoder.ffmpeg_path, yt_dlp).await;
            if !missing_deps.is_empty() {
                eprintln!("⚠️  Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - affected links will fail)");
            }

            let (accepted, rejected) = resolvers::validate_links(&links);
            let result = if accepted.is_empty() {
                PipelineResult::default()
            } else {
                run_pipeline(&config, accepted, cli.quiet, multi).await?
            };

            if !print_summary(&result, &rejected) {
                std::process::exit(1);
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Edit the config file to change settings:");
                println!("  {}", Config::config_path()?.display());
            }
        }
    }

    Ok(())
}

/// Build the collaborators from the configuration and run the batch
async fn run_pipeline(
    config: &Config,
    links: Vec<String>,
    quiet: bool,
    multi: MultiProgress,
) -> Result<PipelineResult> {
    let client = reqwest::Client::builder()
        .user_agent(&config.resolver.user_agent)
        .build()
        .context("Failed to build HTTP client")?;

    let mut resolver = FallbackResolver::new().with(Arc::new(YoutubePageResolver::new(
        client.clone(),
        config.resolver.preferred_qualities.clone(),
    )?));
    if config.resolver.yt_dlp_fallback {
        resolver = resolver.with(Arc::new(YtDlpResolver::new(config.resolver.yt_dlp_path.clone())));
    }
    tracing::debug!("Resolvers: {}", resolver.list_resolvers().join(" -> "));

    let progress: Arc<dyn ProgressSink> = if quiet {
        Arc::new(NoopProgress)
    } else {
        TerminalProgress::new(multi)
    };

    let pipeline = Pipeline::new(
        config.pipeline_settings()?,
        Arc::new(resolver),
        Arc::new(OEmbedFetcher::new(client.clone())),
        Arc::new(HttpPayloadSource::new(client)),
        Arc::new(FfmpegEncoder::new(config.encoder.ffmpeg_path.clone())),
    )
    .with_progress(progress);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling in-flight work");
                cancel.cancel();
            }
        }
    });

    Ok(pipeline.run(links, cancel).await?)
}

/// Print produced files and every error. Returns true if nothing failed.
fn print_summary(result: &PipelineResult, rejected: &[PipelineError]) -> bool {
    let artifacts = result.artifacts();
    if !artifacts.is_empty() {
        println!("\n{}", style("Converted:").green().bold());
        for path in &artifacts {
            println!(" - {}", path.display());
        }
    }

    if !result.outcomes.is_empty() {
        println!(
            "\n{} of {} link(s) converted, {} failed",
            artifacts.len(),
            result.outcomes.len(),
            result.failed_items()
        );
    }

    let errors: Vec<&PipelineError> = rejected.iter().chain(result.errors()).collect();
    if errors.is_empty() {
        return true;
    }

    println!("\n{}", style("The following issues occurred during execution:").red().bold());
    for err in errors {
        println!(" - {}", err);
    }
    println!("\nAddress errors and retry.\n");
    false
}
