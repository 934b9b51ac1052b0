use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::TransferError;
use crate::types::ChunkRange;

/// A readable byte source bound to a session.
///
/// Bindings are transient: they are never persisted and must be
/// re-established (and re-validated) after a restart.
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Name compared against the session's recorded file name.
    fn name(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Reads the bytes of `range`.
    fn read_range(&self, range: &ChunkRange) -> Result<Vec<u8>, TransferError>;
}

fn check_bounds(range: &ChunkRange, size: u64) -> Result<(), TransferError> {
    if range.start > range.end || range.end > size {
        return Err(TransferError::OutOfRange {
            start: range.start,
            end: range.end,
            size,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// A file on disk. Each read opens the file and seeks to the range.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    size: u64,
}

impl FileSource {
    /// Opens `path` and records its name and size.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&self, range: &ChunkRange) -> Result<Vec<u8>, TransferError> {
        check_bounds(range, self.size)?;
        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(range.start))?;
        let mut buf = vec![0u8; range.len() as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// In-memory bytes under a given name.
#[derive(Clone)]
pub struct MemorySource {
    name: String,
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("name", &self.name)
            .field("size", &self.data.len())
            .finish()
    }
}

impl DataSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&self, range: &ChunkRange) -> Result<Vec<u8>, TransferError> {
        check_bounds(range, self.size())?;
        Ok(self.data[range.start as usize..range.end as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn file_source_reads_all_ranges() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.name(), "test.bin");
        assert_eq!(source.size(), 10);

        let chunks: Vec<Vec<u8>> = partition(source.size(), 4)
            .unwrap()
            .iter()
            .map(|r| source.read_range(r).unwrap())
            .collect();
        assert_eq!(chunks, vec![b"AABB".to_vec(), b"CCDD".to_vec(), b"EE".to_vec()]);
    }

    #[test]
    fn file_source_reads_out_of_order() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");
        let source = FileSource::open(&path).unwrap();

        let ranges = partition(10, 4).unwrap();
        assert_eq!(source.read_range(&ranges[2]).unwrap(), b"89");
        assert_eq!(source.read_range(&ranges[0]).unwrap(), b"0123");
    }

    #[test]
    fn file_source_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");
        let source = FileSource::open(&path).unwrap();
        let ranges = partition(source.size(), 4).unwrap();
        assert_eq!(ranges.len(), 1);
        assert!(source.read_range(&ranges[0]).unwrap().is_empty());
    }

    #[test]
    fn file_source_rejects_directory() {
        let dir = TempDir::new().unwrap();
        assert!(FileSource::open(dir.path()).is_err());
    }

    #[test]
    fn out_of_range_read_rejected() {
        let source = MemorySource::new("m.bin", b"abc".to_vec());
        let range = ChunkRange {
            index: 1,
            start: 2,
            end: 6,
        };
        assert!(matches!(
            source.read_range(&range),
            Err(TransferError::OutOfRange { size: 3, .. })
        ));
    }

    #[test]
    fn memory_source_reads_slice() {
        let source = MemorySource::new("m.bin", b"hello world".to_vec());
        let range = ChunkRange {
            index: 1,
            start: 6,
            end: 11,
        };
        assert_eq!(source.read_range(&range).unwrap(), b"world");
    }
}
