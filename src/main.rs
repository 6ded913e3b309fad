/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: main.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 09:31:55
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-05 18:02:37
 */

mod attachment_detector;
mod attachment_store;
mod config;
mod error;
mod fetch_handle;
mod imap_session;
mod pdf_extractor;
mod pipeline;
mod stream_collector;
mod traits;

use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use clap::Parser;
use log::{error, info, warn};
use std::io::Write;
use tokio::signal;

struct MultiWriter {
    writers: Vec<Box<dyn Write + Send + 'static>>,
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for w in &mut self.writers {
            let _ = w.write(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        for w in &mut self.writers {
            let _ = w.flush();
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config: Option<String>,
}

fn initialize_logger(config: &AppConfig) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();

    if let Some(level) = &config.log_level {
        builder.parse_filters(level);
    } else if let Ok(env_level) = std::env::var("RUST_LOG") {
        builder.parse_filters(&env_level);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }

    if let Some(log_file) = &config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", log_file, e))?;

        if config.quiet {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        } else {
            let multi_writer = MultiWriter {
                writers: vec![Box::new(file), Box::new(std::io::stderr())],
            };
            builder.target(env_logger::Target::Pipe(Box::new(multi_writer)));
        }
    } else if config.quiet {
        builder.target(env_logger::Target::Pipe(Box::new(std::io::sink())));
    }

    builder.init();
    Ok(())
}

// One session, one phase at a time: no need for a multi-threaded runtime
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => AppConfig::new_from_file(&path),
        None => AppConfig::new(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to load config: {:?}", e);
        if let Ok(path) = std::env::current_dir() {
            eprintln!("Current search path: {:?}", path);
        }
        eprintln!("Please create a `config.toml` or set APP__... environment variables, or specify a config file with --config.");
        std::process::exit(1);
    });

    initialize_logger(&config)?;

    info!("Starting PDF fetcher...");
    info!(
        "Looking for messages from {} in {} on {}",
        config.sender_filter, config.mailbox.folder, config.mailbox.host
    );
    if let Some(folder) = &config.destination_folder {
        info!("Saving attachments to {}", folder.display());
    }

    let mut pipeline = Pipeline::new(&config);

    let result = tokio::select! {
        result = pipeline.run() => result,
        _ = signal::ctrl_c() => {
            warn!("Shutdown signal received (Ctrl+C). Aborting run...");
            return Err(anyhow::anyhow!("run aborted by user"));
        }
    };

    match result {
        Ok(report) => {
            info!("Run finished: {}", report);
            Ok(())
        }
        Err(e) => {
            error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}
