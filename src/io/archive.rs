// Zip-archive-backed resource provider

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use parking_lot::Mutex;
use zip::ZipArchive;

use crate::resource::{ProviderError, ResourceProvider, ResourceStream};

/// Serves the entries of a zip archive.
///
/// Entry names are used as resource names. The archive is read under a lock
/// and each entry is decompressed into memory when opened, so the returned
/// stream does not borrow the archive.
pub struct ArchiveProvider<R: Read + Seek + Send = BufReader<File>> {
    label: String,
    archive: Mutex<ZipArchive<R>>,
    entries: HashSet<String>,
}

impl ArchiveProvider<BufReader<File>> {
    /// Open a zip file on disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|source| ProviderError::Io {
            name: name.clone(),
            source,
        })?;
        Self::new(&format!("zip:{}", name), BufReader::new(file))
    }
}

impl<R: Read + Seek + Send> ArchiveProvider<R> {
    /// Read the central directory from `reader`
    pub fn new(label: &str, reader: R) -> Result<Self, ProviderError> {
        let archive = ZipArchive::new(reader)
            .map_err(|e| ProviderError::Archive(format!("{}: {}", label, e)))?;
        let entries = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(String::from)
            .collect();

        Ok(Self {
            label: label.to_string(),
            archive: Mutex::new(archive),
            entries,
        })
    }

    /// Number of file entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<R: Read + Seek + Send> ResourceProvider for ArchiveProvider<R> {
    fn name(&self) -> &str {
        &self.label
    }

    fn can_resolve(&self, name: &str) -> bool {
        self.entries.contains(name)
    }

    fn open_stream(&self, name: &str) -> Result<ResourceStream, ProviderError> {
        if !self.entries.contains(name) {
            return Err(ProviderError::NotFound {
                provider: self.label.clone(),
                name: name.to_string(),
            });
        }

        let mut archive = self.archive.lock();
        let mut entry = archive
            .by_name(name)
            .map_err(|e| ProviderError::Archive(format!("{}: {}: {}", self.label, name, e)))?;

        // The declared size comes from the archive and is not trusted.
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(|source| ProviderError::Io {
            name: name.to_string(),
            source,
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

impl<R: Read + Seek + Send> std::fmt::Debug for ArchiveProvider<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveProvider")
            .field("label", &self.label)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_reads_entries() {
        let bytes = build_zip(&[("sounds/boom.wav", b"RIFF"), ("text/a.txt", b"alpha")]);
        let provider = ArchiveProvider::new("mem.zip", Cursor::new(bytes)).unwrap();

        assert_eq!(provider.len(), 2);
        assert_eq!(provider.names(), vec!["sounds/boom.wav", "text/a.txt"]);
        assert!(provider.can_resolve("text/a.txt"));
        assert!(!provider.can_resolve("text/b.txt"));

        let mut out = String::new();
        provider
            .open_stream("text/a.txt")
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "alpha");
    }

    #[test]
    fn test_missing_entry() {
        let bytes = build_zip(&[("a", b"1")]);
        let provider = ArchiveProvider::new("mem.zip", Cursor::new(bytes)).unwrap();
        assert!(matches!(
            provider.open_stream("b"),
            Err(ProviderError::NotFound { .. })
        ));
    }

    #[test]
    fn test_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.zip");
        std::fs::write(&path, build_zip(&[("x.bin", &[1, 2, 3])])).unwrap();

        let provider = ArchiveProvider::open(&path).unwrap();
        assert!(provider.name().starts_with("zip:"));
        assert!(provider.can_resolve("x.bin"));
    }

    #[test]
    fn test_oversized_declared_entry_is_not_preallocated() {
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("big.bin", options).unwrap();
        writer.write_all(b"tiny").unwrap();
        let mut bytes = writer.finish().unwrap().into_inner();

        // Claim an uncompressed size of almost 4 GiB in the central directory.
        let central = bytes
            .windows(4)
            .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        let provider = ArchiveProvider::new("crafted.zip", Cursor::new(bytes)).unwrap();
        if let Ok(mut stream) = provider.open_stream("big.bin") {
            let mut out = Vec::new();
            stream.read_to_end(&mut out).unwrap();
            assert_eq!(out, b"tiny");
        }
    }

    #[test]
    fn test_not_a_zip() {
        let result = ArchiveProvider::new("junk", Cursor::new(b"not a zip".to_vec()));
        assert!(matches!(result, Err(ProviderError::Archive(_))));
    }
}
