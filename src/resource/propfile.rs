// Property File Parser
// Parses simple `key = value` property files with `#` comments

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Parse property file text, invoking `handler` for each key-value pair.
///
/// Key case is preserved. Everything after a `#` is a comment, whether it
/// starts the line or follows a value. Keys and values are trimmed. Lines
/// without `=` are skipped with a warning.
///
/// # Arguments
/// * `data` - The property file content to parse
/// * `handler` - Callback invoked with `(key, value)` for each entry
pub fn parse_propfile(data: &str, handler: &mut dyn FnMut(&str, &str)) {
    for (line_no, raw) in data.lines().enumerate() {
        let line = match raw.find('#') {
            Some(hash) => &raw[..hash],
            None => raw,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            log::warn!("Property line {} has a key without a value", line_no + 1);
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            log::warn!("Property line {} has a value without a key", line_no + 1);
            continue;
        }

        handler(key, value.trim());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("Property file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("I/O error reading property file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Property file containing key-value pairs
///
/// Lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyFile {
    properties: HashMap<String, String>,
}

impl PropertyFile {
    /// Load a property file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PropertyError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => PropertyError::FileNotFound(path.to_path_buf()),
            _ => PropertyError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        Ok(Self::from_string(&content))
    }

    /// Parse a property file from a string
    pub fn from_string(content: &str) -> Self {
        let mut properties = HashMap::new();
        parse_propfile(content, &mut |key, value| {
            properties.insert(key.to_uppercase(), value.to_string());
        });
        PropertyFile { properties }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(&key.to_uppercase()).map(String::as_str)
    }

    /// `true`/`false`, `yes`/`no`, `1`/`0`, any case
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }

    /// Comma-separated list; empty items are dropped
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(&key.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn collect(data: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        parse_propfile(data, &mut |k, v| out.push((k.to_string(), v.to_string())));
        out
    }

    #[test]
    fn test_propfile_basic_keyvalue() {
        let pairs = collect("a = 1\nB=two\n");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("B".to_string(), "two".to_string())
            ]
        );
    }

    #[test]
    fn test_propfile_comments_and_blank_lines() {
        let pairs = collect("# header\n\n  key = value # trailing\n   \n");
        assert_eq!(pairs, vec![("key".to_string(), "value".to_string())]);
    }

    #[test]
    fn test_propfile_key_without_value_skipped() {
        let pairs = collect("orphan\n= nokey\nok=1");
        assert_eq!(pairs, vec![("ok".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_typed_getters() {
        let pf = PropertyFile::from_string(
            "backgroundWorkerThreads = 4\ndrain = yes\narchives = a.zip, ,b.zip\n",
        );
        assert_eq!(pf.len(), 3);
        assert_eq!(pf.get("BACKGROUNDWORKERTHREADS"), Some("4"));
        assert_eq!(pf.get_bool("drain"), Some(true));
        assert_eq!(pf.get_list("archives"), vec!["a.zip", "b.zip"]);
        assert!(pf.get_list("missing").is_empty());
        assert_eq!(pf.get_bool("backgroundWorkerThreads"), None);
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "contentDir = /data").unwrap();

        let pf = PropertyFile::load(file.path()).unwrap();
        assert_eq!(pf.get("contentdir"), Some("/data"));
        assert!(pf.contains("CONTENTDIR"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PropertyFile::load(dir.path().join("nope.cfg")).unwrap_err();
        assert!(matches!(err, PropertyError::FileNotFound(_)));
    }
}
