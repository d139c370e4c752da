//! Streaming file reading and discovery
//!
//! Enumerates transcript files under one or more roots and streams them one
//! line at a time. A line that fails to parse increments a skip counter and
//! never aborts the file; a file over the configured size ceiling is skipped
//! entirely with the condition recorded by the caller. Only O(1) lines are
//! held in memory per file.

use crate::models::RawLogEntry;
use anyhow::{Context, Result};
use glob::glob;
use std::collections::HashSet;
use std::fs::metadata;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Per-file line accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub lines_processed: u64,
    pub lines_skipped: u64,
}

/// Recursively find `*.jsonl` transcript files under `roots`.
///
/// The result is deduplicated and sorted by modification time ascending with
/// the full path as tie-break, so truncation via `max_files` selects a
/// stable, reproducible subset across runs. A missing or unreadable root is
/// recorded as a non-fatal error string and contributes zero files.
pub fn discover_transcript_files(
    roots: &[PathBuf],
    max_files: Option<usize>,
) -> (Vec<PathBuf>, Vec<String>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for root in roots {
        if !root.is_dir() {
            errors.push(format!(
                "transcript root is not a directory: {}",
                root.display()
            ));
            continue;
        }

        let pattern = root.join("**").join("*.jsonl");
        match glob(&pattern.to_string_lossy()) {
            Ok(paths) => {
                for entry in paths.flatten() {
                    if entry.is_file() && seen.insert(entry.clone()) {
                        files.push(entry);
                    }
                }
            }
            Err(e) => {
                errors.push(format!("bad glob pattern for {}: {}", root.display(), e));
            }
        }
    }

    files.sort_by(|a, b| {
        let a_mtime = metadata(a)
            .and_then(|m| m.modified())
            .unwrap_or(std::time::UNIX_EPOCH);
        let b_mtime = metadata(b)
            .and_then(|m| m.modified())
            .unwrap_or(std::time::UNIX_EPOCH);
        a_mtime.cmp(&b_mtime).then_with(|| a.cmp(b))
    });

    if let Some(max) = max_files {
        files.truncate(max);
    }

    debug!(files = files.len(), "transcript discovery complete");
    (files, errors)
}

/// Streams parseable entries out of one transcript file.
pub struct LineStream {
    reader: BufReader<File>,
    buf: Vec<u8>,
    stats: FileStats,
    max_lines: Option<u64>,
}

impl LineStream {
    /// Open a transcript for streaming. Fails (non-fatally for the run) if
    /// the file is unreadable or exceeds the size ceiling.
    pub async fn open(
        path: &Path,
        max_file_size_bytes: u64,
        max_lines: Option<usize>,
    ) -> Result<Self> {
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("cannot stat {}", path.display()))?;

        if meta.len() > max_file_size_bytes {
            anyhow::bail!(
                "file exceeds size ceiling ({} bytes > {} bytes), skipped",
                meta.len(),
                max_file_size_bytes
            );
        }

        let file = File::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;

        Ok(Self {
            reader: BufReader::new(file),
            buf: Vec::new(),
            stats: FileStats::default(),
            max_lines: max_lines.map(|n| n as u64),
        })
    }

    /// Yield the next parseable entry, skipping and counting invalid lines.
    /// Lines are read as raw bytes and decoded lossily, so invalid UTF-8 is
    /// just another unparseable line and never ends the file. Returns `None`
    /// at end of file, on the `max_lines` cap, or after an I/O error.
    pub async fn next_entry(&mut self) -> Option<RawLogEntry> {
        loop {
            if let Some(max) = self.max_lines {
                if self.stats.lines_processed + self.stats.lines_skipped >= max {
                    return None;
                }
            }

            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "read error mid-file, remaining lines unavailable");
                    self.stats.lines_skipped += 1;
                    return None;
                }
            }

            let line = String::from_utf8_lossy(&self.buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match RawLogEntry::parse(line) {
                Some(entry) => {
                    self.stats.lines_processed += 1;
                    return Some(entry);
                }
                None => {
                    self.stats.lines_skipped += 1;
                }
            }
        }
    }

    pub fn stats(&self) -> FileStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_discovery_recurses_and_dedups() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("proj/nested")).unwrap();
        write_file(dir.path(), "a.jsonl", &["{}"]);
        write_file(&dir.path().join("proj/nested"), "b.jsonl", &["{}"]);
        write_file(dir.path(), "notes.txt", &["skip me"]);

        let (files, errors) = discover_transcript_files(&[dir.path().to_path_buf()], None);
        assert_eq!(files.len(), 2);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_discovery_missing_root_is_nonfatal() {
        let (files, errors) =
            discover_transcript_files(&[PathBuf::from("/nonexistent/nowhere")], None);
        assert!(files.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_discovery_max_files_stable_order() {
        let dir = TempDir::new().unwrap();
        for i in 0..15 {
            write_file(dir.path(), &format!("f{:02}.jsonl", i), &["{}"]);
        }
        let roots = [dir.path().to_path_buf()];
        let (first, _) = discover_transcript_files(&roots, Some(10));
        let (second, _) = discover_transcript_files(&roots, Some(10));
        assert_eq!(first.len(), 10);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stream_skips_invalid_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "mixed.jsonl",
            &[
                r#"{"type":"user","sessionId":"s1","message":{"content":"hi"}}"#,
                "not json at all",
                "",
                r#"{"type":"assistant","sessionId":"s1","message":{"content":"hello"}}"#,
            ],
        );

        let mut stream = LineStream::open(&path, u64::MAX, None).await.unwrap();
        let mut entries = 0;
        while stream.next_entry().await.is_some() {
            entries += 1;
        }
        assert_eq!(entries, 2);
        let stats = stream.stats();
        assert_eq!(stats.lines_processed, 2);
        assert_eq!(stats.lines_skipped, 1);
    }

    #[tokio::test]
    async fn test_stream_honors_max_lines() {
        let dir = TempDir::new().unwrap();
        let lines: Vec<String> = (0..10)
            .map(|i| format!(r#"{{"type":"user","sessionId":"s{}","message":{{"content":"m"}}}}"#, i))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let path = write_file(dir.path(), "capped.jsonl", &refs);

        let mut stream = LineStream::open(&path, u64::MAX, Some(3)).await.unwrap();
        let mut entries = 0;
        while stream.next_entry().await.is_some() {
            entries += 1;
        }
        assert_eq!(entries, 3);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_abort_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("binary.jsonl");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(br#"{"type":"user","sessionId":"s1","message":{"content":"one"}}"#);
        bytes.push(b'\n');
        bytes.extend_from_slice(&[0xFF, 0xFE, 0xFD]);
        bytes.push(b'\n');
        bytes.extend_from_slice(br#"{"type":"user","sessionId":"s1","message":{"content":"two"}}"#);
        bytes.push(b'\n');
        bytes.extend_from_slice(br#"{"type":"user","sessionId":"s1","message":{"content":"three"}}"#);
        bytes.push(b'\n');
        std::fs::write(&path, bytes).unwrap();

        let mut stream = LineStream::open(&path, u64::MAX, None).await.unwrap();
        let mut entries = 0;
        while stream.next_entry().await.is_some() {
            entries += 1;
        }
        // the corrupt line is one skip; every valid line after it survives
        assert_eq!(entries, 3);
        let stats = stream.stats();
        assert_eq!(stats.lines_processed, 3);
        assert_eq!(stats.lines_skipped, 1);
    }

    #[tokio::test]
    async fn test_oversized_file_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "big.jsonl", &[r#"{"type":"user"}"#]);
        let result = LineStream::open(&path, 1, None).await;
        assert!(result.is_err());
    }
}
