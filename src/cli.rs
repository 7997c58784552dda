use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::{parse_log_level, Options};

/// Load named resources through the background resource cache
#[derive(Parser, Debug, Default)]
#[command(name = "rescache")]
#[command(version)]
#[command(about = "Load named resources from directories and zip archives", long_about = None)]
pub struct Cli {
    /// Property file with cache settings
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Content directory path
    #[arg(short = 'd', long = "content-dir", value_name = "CONTENTDIR")]
    pub content_dir: Option<String>,

    /// Zip archive to mount (can be specified multiple times)
    #[arg(short, long, value_name = "ARCHIVE")]
    pub archive: Vec<String>,

    /// Number of background loader threads
    #[arg(short, long, value_name = "COUNT")]
    pub workers: Option<String>,

    /// Log level (0-6 or nothing, user, error, warning, info, debug, all)
    #[arg(short, long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Resource names to load
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,
}

impl Cli {
    /// Merge CLI arguments into the options struct
    pub fn merge_into_options(&self, mut opts: Options) -> Result<Options> {
        if let Some(ref content_dir) = self.content_dir {
            opts.content_dir = Some(content_dir.clone());
        }

        if !self.archive.is_empty() {
            opts.archives = self.archive.clone();
        }

        if let Some(ref workers) = self.workers {
            opts.workers = Some(Self::parse_workers(workers)?);
        }

        if let Some(ref level) = self.log_level {
            opts.log_level = Some(parse_log_level(level)?);
        }

        if !self.names.is_empty() {
            opts.preload = self.names.clone();
        }

        Ok(opts)
    }

    fn parse_workers(s: &str) -> Result<usize> {
        s.trim()
            .parse()
            .with_context(|| format!("Invalid worker count: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;

    #[test]
    fn test_parse_workers() {
        assert_eq!(Cli::parse_workers("0").unwrap(), 0);
        assert_eq!(Cli::parse_workers(" 4 ").unwrap(), 4);
        assert!(Cli::parse_workers("-1").is_err());
        assert!(Cli::parse_workers("four").is_err());
    }

    #[test]
    fn test_parse_from_args() {
        let cli = Cli::parse_from([
            "rescache",
            "--content-dir",
            "content",
            "-a",
            "base.zip",
            "-a",
            "addon.zip",
            "-w",
            "3",
            "textures/foo.png",
        ]);
        assert_eq!(cli.content_dir.as_deref(), Some("content"));
        assert_eq!(cli.archive, vec!["base.zip", "addon.zip"]);
        assert_eq!(cli.names, vec!["textures/foo.png"]);
    }

    #[test]
    fn test_merge_overrides_config() {
        let base = Options {
            workers: Some(1),
            content_dir: Some("from-config".to_string()),
            archives: vec!["config.zip".to_string()],
            ..Default::default()
        };
        let cli = Cli {
            workers: Some("0".to_string()),
            log_level: Some("debug".to_string()),
            names: vec!["a".to_string()],
            ..Default::default()
        };

        let opts = cli.merge_into_options(base).unwrap();
        assert_eq!(opts.workers, Some(0));
        assert_eq!(opts.content_dir.as_deref(), Some("from-config"));
        assert_eq!(opts.archives, vec!["config.zip"]);
        assert_eq!(opts.log_level, Some(LogLevel::Debug));
        assert_eq!(opts.preload, vec!["a"]);
    }

    #[test]
    fn test_invalid_log_level() {
        let cli = Cli {
            log_level: Some("chatty".to_string()),
            ..Default::default()
        };
        assert!(cli.merge_into_options(Options::default()).is_err());
    }
}
