// Directory-backed resource provider

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use crate::resource::{ProviderError, ResourceProvider, ResourceStream};

/// Serves files below a root directory.
///
/// Resource names are relative `/`-separated paths. Absolute names and names
/// that step outside the root with `..` are rejected.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    label: String,
    root: PathBuf,
}

impl DirectoryProvider {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            label: format!("dir:{}", root.display()),
            root,
        }
    }

    /// Same as `new`, with a custom diagnostic label
    pub fn with_label<P: AsRef<Path>>(label: &str, root: P) -> Self {
        Self {
            label: label.to_string(),
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a resource name to a path under the root
    fn path_for(&self, name: &str) -> Result<PathBuf, ProviderError> {
        let relative = Path::new(name);
        let is_plain = !name.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(ProviderError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ResourceProvider for DirectoryProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn can_resolve(&self, name: &str) -> bool {
        self.path_for(name).map(|path| path.is_file()).unwrap_or(false)
    }

    fn open_stream(&self, name: &str) -> Result<ResourceStream, ProviderError> {
        let path = self.path_for(name)?;
        let file = File::open(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ProviderError::NotFound {
                provider: self.label.clone(),
                name: name.to_string(),
            },
            _ => ProviderError::Io {
                name: name.to_string(),
                source,
            },
        })?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    fn content_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("textures")).unwrap();
        fs::write(dir.path().join("textures/foo.png"), b"png-bytes").unwrap();
        fs::write(dir.path().join("readme.txt"), b"hi").unwrap();
        dir
    }

    #[test]
    fn test_resolves_nested_file() {
        let dir = content_dir();
        let provider = DirectoryProvider::new(dir.path());

        assert!(provider.can_resolve("textures/foo.png"));
        let mut stream = provider.open_stream("textures/foo.png").unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"png-bytes");
    }

    #[test]
    fn test_directories_and_missing_files_are_not_resources() {
        let dir = content_dir();
        let provider = DirectoryProvider::new(dir.path());

        assert!(!provider.can_resolve("textures"));
        assert!(!provider.can_resolve("textures/bar.png"));
        assert!(matches!(
            provider.open_stream("textures/bar.png"),
            Err(ProviderError::NotFound { .. })
        ));
    }

    #[test]
    fn test_rejects_escaping_names() {
        let dir = content_dir();
        let inner = DirectoryProvider::new(dir.path().join("textures"));

        for name in ["../readme.txt", "/etc/passwd", "", "./foo.png"] {
            assert!(!inner.can_resolve(name), "{} should be rejected", name);
            assert!(matches!(
                inner.open_stream(name),
                Err(ProviderError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_label() {
        let provider = DirectoryProvider::with_label("content", "/nonexistent");
        assert_eq!(provider.name(), "content");
        assert_eq!(provider.root(), Path::new("/nonexistent"));
    }
}
