use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use rescache::io::{ArchiveProvider, DirectoryProvider};
use rescache::resource::{BytesLoader, ResourceCache, ResourceState};
use rescache::{logging, Cli, Options};

/// Archives mounted later win over earlier ones; the content directory
/// sits below every archive.
const DIRECTORY_PRIORITY: i32 = 0;
const ARCHIVE_PRIORITY_BASE: i32 = 10;

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("rescache: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// # Returns
/// `true` if every requested resource loaded
fn run() -> Result<bool> {
    let cli = Cli::parse();

    let options = match &cli.config {
        Some(path) => rescache::config::load_config(path)?,
        None => Options::default(),
    };
    let options = cli.merge_into_options(options)?;

    logging::init(options.log_level.unwrap_or_default());
    log::info!("Starting with {:?}", options);

    let cache = ResourceCache::new("DATA", options.cache_config(), BytesLoader)
        .context("Failed to start resource cache")?;
    mount_providers(&cache, &options)?;

    let handles = cache.load_batch(options.preload.as_slice(), 0);

    let mut all_ready = true;
    for handle in &handles {
        match handle.state() {
            ResourceState::Ready => {
                let size = handle.payload().map_or(0, Vec::len);
                println!(
                    "{}\t{}\t{} bytes\t{}",
                    handle.name(),
                    ResourceState::Ready,
                    size,
                    handle.provider_used().unwrap_or("-")
                );
            }
            state => {
                all_ready = false;
                println!(
                    "{}\t{}\t{}",
                    handle.name(),
                    state,
                    handle.failure().unwrap_or("unknown error")
                );
            }
        }
    }

    let stats = cache.stats();
    log::info!(
        "{} loaded, {} failed, {} loader runs",
        stats.ready,
        stats.failed,
        stats.loads_started
    );

    drop(handles);
    cache.shutdown();
    Ok(all_ready)
}

fn mount_providers(cache: &ResourceCache<Vec<u8>>, options: &Options) -> Result<()> {
    if let Some(dir) = &options.content_dir {
        if !Path::new(dir).is_dir() {
            anyhow::bail!("Content directory does not exist: {}", dir);
        }
        cache.register_provider(Arc::new(DirectoryProvider::new(dir)), DIRECTORY_PRIORITY);
    }

    for (index, archive) in options.archives.iter().enumerate() {
        let provider = ArchiveProvider::open(archive)
            .with_context(|| format!("Failed to mount archive {}", archive))?;
        log::info!("Mounted {} ({} entries)", archive, provider.len());
        let priority = ARCHIVE_PRIORITY_BASE.saturating_add(index as i32);
        cache.register_provider(Arc::new(provider), priority);
    }

    if cache.providers().is_empty() {
        log::warn!("No content directory or archives given; every load will fail");
    }
    Ok(())
}
