use std::path::Path;

use anyhow::{Context, Result};

use crate::logging::LogLevel;
use crate::resource::PropertyFile;

/// Construction parameters for a `ResourceCache`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Background loader threads; 0 means queued loads only run on
    /// `flush`, at shutdown, or when a synchronous load claims them
    pub background_worker_threads: usize,
    /// Worker threads are named `{worker_name}-{index}`
    pub worker_name: String,
    /// Run queued loads at shutdown instead of failing them
    pub drain_on_shutdown: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            background_worker_threads: 2,
            worker_name: "res-loader".to_string(),
            drain_on_shutdown: true,
        }
    }
}

impl CacheConfig {
    pub fn with_workers(mut self, count: usize) -> Self {
        self.background_worker_threads = count;
        self
    }

    pub fn with_worker_name(mut self, name: &str) -> Self {
        self.worker_name = name.to_string();
        self
    }

    pub fn with_drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }
}

/// Application options that can be set via CLI or config file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub workers: Option<usize>,
    pub worker_name: Option<String>,
    pub drain_on_shutdown: Option<bool>,
    pub content_dir: Option<String>,
    pub archives: Vec<String>,
    pub log_level: Option<LogLevel>,
    /// Resource names to load at startup
    pub preload: Vec<String>,
}

impl Options {
    /// Cache settings derived from these options
    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::default();
        if let Some(count) = self.workers {
            config = config.with_workers(count);
        }
        if let Some(name) = &self.worker_name {
            config = config.with_worker_name(name);
        }
        if let Some(drain) = self.drain_on_shutdown {
            config = config.with_drain_on_shutdown(drain);
        }
        config
    }
}

/// Load options from a property file
///
/// Recognised keys: `backgroundWorkerThreads`, `workerName`,
/// `drainOnShutdown` (true/false, yes/no, 1/0), `contentDir`, `archives`
/// (comma-separated), `logLevel` (0-6 or a level name) and `preload`
/// (comma-separated). Unknown keys are ignored.
pub fn load_config(path: &Path) -> Result<Options> {
    let props = PropertyFile::load(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    options_from_properties(&props)
}

/// Build options from already-parsed properties
pub fn options_from_properties(props: &PropertyFile) -> Result<Options> {
    let mut opts = Options::default();

    if let Some(workers) = props.get("backgroundWorkerThreads") {
        opts.workers = Some(
            workers
                .parse()
                .with_context(|| format!("Invalid backgroundWorkerThreads value: {}", workers))?,
        );
    }

    opts.worker_name = props.get("workerName").map(String::from);

    if let Some(drain) = props.get("drainOnShutdown") {
        opts.drain_on_shutdown = Some(
            props
                .get_bool("drainOnShutdown")
                .with_context(|| format!("Invalid drainOnShutdown value: {}", drain))?,
        );
    }

    opts.content_dir = props.get("contentDir").map(String::from);
    opts.archives = props.get_list("archives");
    opts.preload = props.get_list("preload");

    if let Some(level) = props.get("logLevel") {
        opts.log_level = Some(parse_log_level(level)?);
    }

    Ok(opts)
}

/// Parse a log level given as a number (0-6) or a name
pub fn parse_log_level(s: &str) -> Result<LogLevel> {
    if let Ok(n) = s.trim().parse::<i32>() {
        if !(0..=6).contains(&n) {
            anyhow::bail!("Log level out of range (0 to 6): {}", n);
        }
        return Ok(LogLevel::from_i32(n));
    }

    LogLevel::parse(s).with_context(|| {
        format!(
            "Invalid log level: {}. Valid options: nothing, user, error, warning, info, debug, all",
            s
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.background_worker_threads, 2);
        assert_eq!(config.worker_name, "res-loader");
        assert!(config.drain_on_shutdown);
    }

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::default()
            .with_workers(0)
            .with_worker_name("io")
            .with_drain_on_shutdown(false);
        assert_eq!(config.background_worker_threads, 0);
        assert_eq!(config.worker_name, "io");
        assert!(!config.drain_on_shutdown);
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("5").unwrap(), LogLevel::Debug);
        assert_eq!(parse_log_level("warning").unwrap(), LogLevel::Warning);
        assert_eq!(parse_log_level("ERROR").unwrap(), LogLevel::Error);
        assert!(parse_log_level("7").is_err());
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_options_from_properties() {
        let props = PropertyFile::from_string(
            "backgroundWorkerThreads = 0\n\
             contentDir = content\n\
             archives = base.zip, addon.zip\n\
             logLevel = debug\n\
             preload = a.txt,b.txt\n",
        );
        let opts = options_from_properties(&props).unwrap();

        assert_eq!(opts.workers, Some(0));
        assert_eq!(opts.content_dir.as_deref(), Some("content"));
        assert_eq!(opts.archives, vec!["base.zip", "addon.zip"]);
        assert_eq!(opts.log_level, Some(LogLevel::Debug));
        assert_eq!(opts.preload, vec!["a.txt", "b.txt"]);
        assert_eq!(opts.cache_config().background_worker_threads, 0);
    }

    #[test]
    fn test_worker_settings_reach_cache_config() {
        let props = PropertyFile::from_string(
            "workerName = io\n\
             drainOnShutdown = no\n",
        );
        let opts = options_from_properties(&props).unwrap();
        assert_eq!(opts.worker_name.as_deref(), Some("io"));
        assert_eq!(opts.drain_on_shutdown, Some(false));

        let config = opts.cache_config();
        assert_eq!(config.worker_name, "io");
        assert!(!config.drain_on_shutdown);
        assert_eq!(config.background_worker_threads, 2);
    }

    #[test]
    fn test_invalid_drain_flag() {
        let props = PropertyFile::from_string("drainOnShutdown = sometimes");
        assert!(options_from_properties(&props).is_err());
    }

    #[test]
    fn test_invalid_worker_count() {
        let props = PropertyFile::from_string("backgroundWorkerThreads = many");
        assert!(options_from_properties(&props).is_err());
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# cache settings").unwrap();
        writeln!(file, "backgroundWorkerThreads = 3").unwrap();

        let opts = load_config(file.path()).unwrap();
        assert_eq!(opts.workers, Some(3));
        assert!(opts.archives.is_empty());
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("missing.cfg")).is_err());
    }

    #[test]
    fn test_options_default() {
        let opts = Options::default();
        assert!(opts.workers.is_none());
        assert_eq!(opts.cache_config(), CacheConfig::default());
    }
}
