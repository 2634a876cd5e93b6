//! Local-directory implementation of the storage adapter.
//!
//! Files live directly under a root directory. `head` reads forward and
//! `tail` reads backward in bounded chunks, so boundary probes on large
//! partitions stay O(lines requested), not O(file).

use std::ffi::OsStr;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::adapter::StorageAdapter;
use crate::error::{Result, StorageError};

/// Probe chunk size for head/tail scans.
const PROBE_CHUNK: usize = 8 * 1024;

/// A storage adapter over a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create an adapter rooted at the given directory.
    ///
    /// The directory does not have to exist yet; it is created on the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The adapter root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        let plain = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !plain {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(rel))
    }

    fn utf8(path: &str, bytes: Vec<u8>) -> Result<String> {
        String::from_utf8(bytes).map_err(|e| StorageError::InvalidData {
            path: path.to_string(),
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl StorageAdapter for LocalStorage {
    async fn collection(&self, extension: &str) -> Result<Vec<String>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if extension != "*"
                && Path::new(name).extension().and_then(OsStr::to_str) != Some(extension)
            {
                continue;
            }
            names.push(name.to_string());
        }
        names.sort();
        Ok(names)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(fs::try_exists(self.resolve(path)?).await?)
    }

    async fn size(&self, path: &str) -> Result<u64> {
        Ok(fs::metadata(self.resolve(path)?).await?.len())
    }

    async fn read(&self, path: &str) -> Result<String> {
        let bytes = fs::read(self.resolve(path)?).await?;
        Self::utf8(path, bytes)
    }

    async fn head(&self, path: &str, n: usize) -> Result<String> {
        let mut file = fs::File::open(self.resolve(path)?).await?;
        let mut acc = Vec::new();
        let mut seen = 0usize;
        let mut buf = vec![0u8; PROBE_CHUNK];

        loop {
            let read = file.read(&mut buf).await?;
            if read == 0 {
                // Fewer than n lines: the whole file.
                return Self::utf8(path, acc);
            }
            for (i, &b) in buf[..read].iter().enumerate() {
                if b == b'\n' {
                    seen += 1;
                    if seen == n {
                        acc.extend_from_slice(&buf[..=i]);
                        return Self::utf8(path, acc);
                    }
                }
            }
            acc.extend_from_slice(&buf[..read]);
        }
    }

    async fn tail(&self, path: &str, n: usize) -> Result<String> {
        let mut file = fs::File::open(self.resolve(path)?).await?;
        let len = file.metadata().await?.len();
        if len == 0 || n == 0 {
            return Ok(String::new());
        }

        // `assembled` always covers pos..len of the file.
        let mut assembled: Vec<u8> = Vec::new();
        let mut pos = len;

        loop {
            let start = pos.saturating_sub(PROBE_CHUNK as u64);
            let read_len = (pos - start) as usize;
            file.seek(SeekFrom::Start(start)).await?;
            let mut chunk = vec![0u8; read_len];
            file.read_exact(&mut chunk).await?;
            chunk.extend_from_slice(&assembled);
            assembled = chunk;

            let mut seen = 0usize;
            for i in (0..assembled.len()).rev() {
                if assembled[i] != b'\n' {
                    continue;
                }
                // `assembled` always ends at EOF, so a newline in final
                // position terminates the last line rather than bounding
                // a previous one.
                if i == assembled.len() - 1 {
                    continue;
                }
                seen += 1;
                if seen == n {
                    return Self::utf8(path, assembled[i + 1..].to_vec());
                }
            }

            if start == 0 {
                // Fewer than n lines: the whole file.
                return Self::utf8(path, assembled);
            }
            pos = start;
        }
    }

    async fn append(&self, path: &str, data: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&full)
            .await?;
        file.write_all(data.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn write(&self, path: &str, data: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Replace atomically: hidden temp file in the same directory,
        // then rename over the target.
        let file_name = full
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;
        let tmp = full.with_file_name(format!(".{file_name}.tmp"));
        fs::write(&tmp, data.as_bytes()).await?;
        fs::rename(&tmp, &full).await?;
        Ok(())
    }
}
