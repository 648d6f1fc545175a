use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::parser::{LineOutcome, parse_transcript_line};
use crate::types::{IngestIssue, TailBatch};

pub(crate) fn is_transcript_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|value| value.to_str()),
        Some("jsonl")
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FileCursor {
    line_index: u64,
    byte_offset: u64,
}

/// Incrementally reads appended transcript lines. Cursors live in memory
/// only; a new tailer starts every file from the top.
#[derive(Debug, Default)]
pub struct TranscriptTailer {
    cursors: HashMap<PathBuf, FileCursor>,
}

impl TranscriptTailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_index(&self, path: &Path) -> u64 {
        self.cursors
            .get(path)
            .map(|cursor| cursor.line_index)
            .unwrap_or(0)
    }

    pub fn tracked_files(&self) -> usize {
        self.cursors.len()
    }

    pub fn read_new_lines(&mut self, path: &Path) -> TailBatch {
        let cursor = self.cursors.get(path).copied().unwrap_or_default();
        let (next, batch) = tail_file(path, cursor);
        self.store(path.to_path_buf(), next);
        batch
    }

    pub fn scan(&mut self, root: &Path) -> TailBatch {
        let mut batch = TailBatch::default();
        if !root.is_dir() {
            return batch;
        }
        let mut tasks = Vec::new();
        for entry in WalkDir::new(root).follow_links(false).into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let file_path = err
                        .path()
                        .map(|path| path.to_string_lossy().to_string())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    batch.issues.push(IngestIssue {
                        file_path,
                        line: None,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_transcript_path(path) {
                continue;
            }
            let cursor = self.cursors.get(path).copied().unwrap_or_default();
            tasks.push((path.to_path_buf(), cursor));
        }

        let results = tasks
            .into_par_iter()
            .map(|(path, cursor)| {
                let (next, batch) = tail_file(&path, cursor);
                (path, next, batch)
            })
            .collect::<Vec<_>>();
        for (path, next, file_batch) in results {
            self.store(path, next);
            batch.absorb(file_batch);
        }
        batch
    }

    fn store(&mut self, path: PathBuf, cursor: FileCursor) {
        if cursor == FileCursor::default() {
            self.cursors.remove(&path);
        } else {
            self.cursors.insert(path, cursor);
        }
    }
}

fn read_from(path: &Path, offset: u64) -> io::Result<Option<(u64, Vec<u8>)>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let len = file.metadata()?.len();
    if len < offset {
        return Ok(Some((len, Vec::new())));
    }
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity((len - offset) as usize);
    file.read_to_end(&mut buf)?;
    Ok(Some((len, buf)))
}

fn tail_file(path: &Path, cursor: FileCursor) -> (FileCursor, TailBatch) {
    let file_path = path.to_string_lossy().to_string();
    let mut batch = TailBatch::default();

    let (len, bytes) = match read_from(path, cursor.byte_offset) {
        Ok(Some(read)) => read,
        Ok(None) => return (FileCursor::default(), batch),
        Err(err) => {
            warn!(file = %file_path, error = %err, "failed to read transcript");
            batch.issues.push(IngestIssue {
                file_path,
                line: None,
                message: err.to_string(),
            });
            return (cursor, batch);
        }
    };
    if len < cursor.byte_offset {
        debug!(file = %file_path, "transcript shrank, rereading from the start");
        return tail_file(path, FileCursor::default());
    }

    batch.files_read = 1;
    let mut next = cursor;
    let mut consumed = 0usize;
    while let Some(newline) = bytes[consumed..].iter().position(|byte| *byte == b'\n') {
        let raw = &bytes[consumed..consumed + newline];
        consumed += newline + 1;
        let line_index = next.line_index;
        next.line_index += 1;
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        match parse_transcript_line(line, &file_path, line_index) {
            LineOutcome::Metric(entry) => batch.metrics.push(*entry),
            LineOutcome::NoUsage => {
                warn!(file = %file_path, line = line_index, "skipping transcript line without usage");
            }
            LineOutcome::Malformed(message) => {
                warn!(file = %file_path, line = line_index, error = %message, "skipping malformed transcript line");
                batch.issues.push(IngestIssue {
                    file_path: file_path.clone(),
                    line: Some(line_index),
                    message,
                });
            }
        }
    }
    next.byte_offset += consumed as u64;
    (next, batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;

    const USAGE: &str = r#"{"timestamp":"2025-06-01T12:00:00Z","message":{"model":"claude-3-5-haiku-20241022","usage":{"input_tokens":10,"output_tokens":2}}}"#;

    #[test]
    fn partial_lines_wait_for_their_newline() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("s-1.jsonl");
        fs::write(&path, format!("{USAGE}\n{}", &USAGE[..20])).expect("write");

        let mut tailer = TranscriptTailer::new();
        assert_eq!(tailer.read_new_lines(&path).metrics.len(), 1);
        assert_eq!(tailer.line_index(&path), 1);

        let mut file = OpenOptions::new().append(true).open(&path).expect("open");
        writeln!(file, "{}", &USAGE[20..]).expect("append");
        let batch = tailer.read_new_lines(&path);
        assert_eq!(batch.metrics.len(), 1);
        assert!(batch.issues.is_empty());
        assert_eq!(tailer.line_index(&path), 2);
        assert!(tailer.read_new_lines(&path).metrics.is_empty());
    }

    #[test]
    fn lines_without_usage_are_skipped_and_reading_continues() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("s-3.jsonl");
        let user_turn = r#"{"type":"user","message":{"role":"user","content":"hi"}}"#;
        fs::write(&path, format!("{user_turn}\nnot json\n{USAGE}\n")).expect("write");

        let mut tailer = TranscriptTailer::new();
        let batch = tailer.read_new_lines(&path);
        assert_eq!(batch.metrics.len(), 1);
        assert_eq!(batch.issues.len(), 1);
        assert_eq!(batch.issues[0].line, Some(1));
        assert_eq!(tailer.line_index(&path), 3);
    }

    #[test]
    fn truncated_file_is_reread() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("s-2.jsonl");
        fs::write(&path, format!("{USAGE}\n{USAGE}\n")).expect("write");
        let mut tailer = TranscriptTailer::new();
        assert_eq!(tailer.read_new_lines(&path).metrics.len(), 2);

        fs::write(&path, format!("{USAGE}\n")).expect("truncate");
        let batch = tailer.read_new_lines(&path);
        assert_eq!(batch.metrics.len(), 1);
        assert_eq!(tailer.line_index(&path), 1);
    }
}
