//! In-memory implementation of the storage adapter.
//!
//! Same semantics as [`LocalStorage`](crate::LocalStorage) but over a map
//! of path to contents. Primarily for tests; all data is lost when the
//! adapter is dropped.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::adapter::StorageAdapter;
use crate::error::{Result, StorageError};

/// A map-backed storage adapter. Thread-safe via `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    /// Create a new empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_file<T>(&self, path: &str, f: impl FnOnce(&str) -> T) -> Result<T> {
        let files = self.files.read().unwrap();
        let content = files.get(path).ok_or_else(|| not_found(path))?;
        Ok(f(content))
    }
}

fn not_found(path: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no such file: {path}"),
    ))
}

/// The first `n` lines of `text`, terminators included, or all of it.
fn head_lines(text: &str, n: usize) -> String {
    let mut seen = 0usize;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            seen += 1;
            if seen == n {
                return text[..=i].to_string();
            }
        }
    }
    text.to_string()
}

/// The last `n` lines of `text`, terminators included, or all of it.
fn tail_lines(text: &str, n: usize) -> String {
    if text.is_empty() || n == 0 {
        return String::new();
    }
    let bytes = text.as_bytes();
    let mut seen = 0usize;
    for i in (0..bytes.len()).rev() {
        if bytes[i] != b'\n' {
            continue;
        }
        // A trailing newline terminates the last line.
        if i == bytes.len() - 1 {
            continue;
        }
        seen += 1;
        if seen == n {
            return text[i + 1..].to_string();
        }
    }
    text.to_string()
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn collection(&self, extension: &str) -> Result<Vec<String>> {
        let files = self.files.read().unwrap();
        Ok(files
            .keys()
            .filter(|name| !name.starts_with('.'))
            .filter(|name| {
                extension == "*"
                    || Path::new(name).extension().and_then(OsStr::to_str) == Some(extension)
            })
            .cloned()
            .collect())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.read().unwrap().contains_key(path))
    }

    async fn size(&self, path: &str) -> Result<u64> {
        self.with_file(path, |c| c.len() as u64)
    }

    async fn read(&self, path: &str) -> Result<String> {
        self.with_file(path, str::to_string)
    }

    async fn head(&self, path: &str, n: usize) -> Result<String> {
        self.with_file(path, |c| head_lines(c, n))
    }

    async fn tail(&self, path: &str, n: usize) -> Result<String> {
        self.with_file(path, |c| tail_lines(c, n))
    }

    async fn append(&self, path: &str, data: &str) -> Result<()> {
        let mut files = self.files.write().unwrap();
        files.entry(path.to_string()).or_default().push_str(data);
        Ok(())
    }

    async fn write(&self, path: &str, data: &str) -> Result<()> {
        let mut files = self.files.write().unwrap();
        files.insert(path.to_string(), data.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_file_operations() {
        let storage = MemoryStorage::new();
        storage.write("a.csv", "x\n").await.unwrap();
        storage.append("a.csv", "y\n").await.unwrap();

        assert!(storage.exists("a.csv").await.unwrap());
        assert_eq!(storage.size("a.csv").await.unwrap(), 4);
        assert_eq!(storage.read("a.csv").await.unwrap(), "x\ny\n");
        assert!(!storage.exists("b.csv").await.unwrap());
        assert!(storage.read("b.csv").await.is_err());
    }

    #[tokio::test]
    async fn collection_is_sorted_and_filtered() {
        let storage = MemoryStorage::new();
        storage.write("2000-02.csv", "").await.unwrap();
        storage.write("2000-01.csv", "").await.unwrap();
        storage.write("schema.json", "{}").await.unwrap();
        storage.write(".tmp.csv", "").await.unwrap();

        assert_eq!(
            storage.collection("csv").await.unwrap(),
            vec!["2000-01.csv", "2000-02.csv"]
        );
        assert_eq!(
            storage.collection("*").await.unwrap(),
            vec!["2000-01.csv", "2000-02.csv", "schema.json"]
        );
    }

    #[tokio::test]
    async fn head_and_tail_match_local_semantics() {
        let storage = MemoryStorage::new();
        storage.write("a.csv", "h\nr1\nr2\n").await.unwrap();

        assert_eq!(storage.head("a.csv", 2).await.unwrap(), "h\nr1\n");
        assert_eq!(storage.tail("a.csv", 1).await.unwrap(), "r2\n");
        assert_eq!(storage.head("a.csv", 10).await.unwrap(), "h\nr1\nr2\n");
        assert_eq!(storage.tail("a.csv", 10).await.unwrap(), "h\nr1\nr2\n");
    }

    #[test]
    fn tail_lines_without_trailing_newline() {
        assert_eq!(tail_lines("a\nb", 1), "b");
        assert_eq!(tail_lines("a\nb", 2), "a\nb");
        assert_eq!(tail_lines("only", 1), "only");
    }
}
