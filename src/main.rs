mod cli;
mod command;
mod downloader;
mod error;
mod models;
mod presets;
mod progress;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use cli::{Args, Mode};
use downloader::{DownloadOutcome, Downloader};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use models::{AuthOptions, DownloadPreset, DownloadRequest};
use std::fs;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let mut table = presets::builtin_presets();
    if let Some(path) = &args.preset_file {
        let extra = presets::load_preset_file(path)?;
        info!("Loaded {} presets from {}", extra.len(), path.display());
        table = presets::merge_presets(table, extra);
    }

    let auth = AuthOptions {
        use_browser_cookies: args.use_cookies,
        browser: Some(args.browser),
    };
    let downloader = Downloader::new(&args.binary);

    match args.mode {
        Mode::Presets => print_presets(&table, args.json)?,
        Mode::Title => {
            let url = require_url(&args)?;
            let title = downloader
                .fetch_title(url, &auth)
                .await
                .context("Failed to fetch title")?;
            println!("{}", title);
        }
        Mode::Formats => {
            let url = require_url(&args)?;
            let formats = downloader
                .list_formats(url, &auth)
                .await
                .context("Failed to list formats")?;
            print_presets(&formats, args.json)?;
        }
        Mode::Download => {
            let url = require_url(&args)?;
            let preset = presets::find_preset(&table, &args.preset)?.clone();

            if !args.output.exists() {
                fs::create_dir_all(&args.output).with_context(|| {
                    format!("Failed to create output directory {}", args.output.display())
                })?;
            }

            let request = DownloadRequest {
                source_url: url.to_string(),
                preset,
                output_directory: args.output.clone(),
                auth,
            };
            download(&downloader, &request).await?;
        }
    }

    Ok(())
}

fn require_url(args: &Args) -> Result<&str> {
    args.url
        .as_deref()
        .ok_or_else(|| anyhow!("A media URL is required for this mode"))
}

fn print_presets(presets: &[DownloadPreset], json: bool) -> Result<()> {
    if json {
        let content = serde_json::to_string_pretty(presets).context("Failed to serialize presets")?;
        println!("{}", content);
        return Ok(());
    }

    for preset in presets {
        println!("{:>10}  {}", preset.id, preset);
    }
    Ok(())
}

async fn download(downloader: &Downloader, request: &DownloadRequest) -> Result<()> {
    let pb = ProgressBar::new(1000);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:>8} {bar:40} {msg}")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );
    pb.set_prefix(request.preset.id.clone());
    pb.set_message("Starting...");

    let handle = downloader.submit_download(request);

    // Ctrl-C stops the downloader instead of orphaning it
    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = handle
        .drive(
            |sample| {
                pb.set_position((sample.percent_complete * 10.0).round() as u64);
                pb.set_message(format!(
                    "{:5.1}% at {} ETA {}",
                    sample.percent_complete, sample.transfer_rate, sample.estimated_time_remaining
                ));
            },
            |line| {
                if progress::parse_progress_line(&line).is_none() {
                    pb.println(line);
                }
            },
        )
        .await;

    match outcome {
        DownloadOutcome::Succeeded => {
            pb.set_position(1000);
            pb.finish_with_message("Done");
            Ok(())
        }
        DownloadOutcome::Cancelled => {
            pb.abandon_with_message("Cancelled");
            Ok(())
        }
        DownloadOutcome::Failed(e) => {
            pb.abandon_with_message("Failed");
            Err(e).context(format!("Download of {} failed", request.source_url))
        }
    }
}
