//! 产物台账：Worker 没有记忆，跨步骤的命名与进度由控制器根据工作区实际内容维护

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

fn transcript_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^transcript_(\d+)\.txt$").expect("transcript name regex"))
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactLedger {
    #[serde(skip)]
    root: PathBuf,
    transcript_dir: String,
    dataset_file: String,
    /// 字幕目录中已有的文件名（排序）
    saved_transcripts: BTreeSet<String>,
    next_transcript_index: usize,
    dataset_exists: bool,
}

impl ArtifactLedger {
    pub fn new(root: impl AsRef<Path>, transcript_dir: &str, dataset_file: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            transcript_dir: transcript_dir.trim_end_matches('/').to_string(),
            dataset_file: dataset_file.to_string(),
            saved_transcripts: BTreeSet::new(),
            next_transcript_index: 1,
            dataset_exists: false,
        }
    }

    /// 重新扫描工作区；目录不存在视为空
    pub fn refresh(&mut self) {
        self.saved_transcripts.clear();
        let mut highest = 0usize;
        let dir = self.root.join(&self.transcript_dir);
        match std::fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().to_string();
                    if let Some(n) = transcript_name_re()
                        .captures(&name)
                        .and_then(|c| c[1].parse::<usize>().ok())
                        .filter(|n| *n < usize::MAX)
                    {
                        highest = highest.max(n);
                    }
                    self.saved_transcripts.insert(name);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "cannot scan transcript directory"),
        }
        self.next_transcript_index = highest.saturating_add(1);
        self.dataset_exists = self.root.join(&self.dataset_file).is_file();
        tracing::debug!(
            saved = self.saved_transcripts.len(),
            next = self.next_transcript_index,
            dataset_exists = self.dataset_exists,
            "ledger refreshed"
        );
    }

    pub fn next_transcript_name(&self) -> String {
        format!("transcript_{}.txt", self.next_transcript_index)
    }

    /// 写进委派指令的工作区约定
    pub fn conventions(&self) -> String {
        let saved = if self.saved_transcripts.is_empty() {
            "none yet".to_string()
        } else {
            self.saved_transcripts.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        let dataset = if self.dataset_exists {
            format!(
                "The dataset file is {} and it already exists: append new rows only, never rewrite or repeat its header.",
                self.dataset_file
            )
        } else {
            format!(
                "The dataset file is {} and it does not exist yet: the first write must start with the header row.",
                self.dataset_file
            )
        };
        [
            "All paths are relative to the workspace root.".to_string(),
            format!(
                "transcript-fetch saves transcripts into the '{}' directory by itself; give it only a file name.",
                self.transcript_dir
            ),
            format!(
                "Name transcripts transcript_<n>.txt. The next free name is {}; keep counting up from it, one number per video.",
                self.next_transcript_name()
            ),
            format!("Transcripts already saved: {}.", saved),
            dataset,
            "write-file appends to the end of a file; it never overwrites.".to_string(),
        ]
        .iter()
        .map(|line| format!("- {}", line))
        .collect::<Vec<_>>()
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_workspace() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ArtifactLedger::new(dir.path(), "transcripts", "dataset.csv");
        ledger.refresh();
        assert_eq!(ledger.next_transcript_name(), "transcript_1.txt");
        assert!(!ledger.dataset_exists);
        let text = ledger.conventions();
        assert!(text.contains("Transcripts already saved: none yet."));
        assert!(text.contains("does not exist yet"));
    }

    #[test]
    fn test_refresh_finds_next_index_and_dataset() {
        let dir = TempDir::new().unwrap();
        let transcripts = dir.path().join("transcripts");
        std::fs::create_dir_all(&transcripts).unwrap();
        for name in ["transcript_1.txt", "transcript_7.txt", "notes.txt"] {
            std::fs::write(transcripts.join(name), "x").unwrap();
        }
        std::fs::write(dir.path().join("dataset.csv"), "URL,Transcript\n").unwrap();

        let mut ledger = ArtifactLedger::new(dir.path(), "transcripts/", "dataset.csv");
        ledger.refresh();
        assert_eq!(ledger.next_transcript_index, 8);
        assert_eq!(ledger.saved_transcripts.len(), 3);
        assert!(ledger.dataset_exists);
        let text = ledger.conventions();
        assert!(text.contains("transcript_8.txt"));
        assert!(text.contains("notes.txt, transcript_1.txt, transcript_7.txt"));
        assert!(text.contains("already exists"));
    }

    #[test]
    fn test_out_of_range_numbers_do_not_break_numbering() {
        let dir = TempDir::new().unwrap();
        let transcripts = dir.path().join("transcripts");
        std::fs::create_dir_all(&transcripts).unwrap();
        for name in [
            "transcript_2.txt",
            "transcript_18446744073709551615.txt",
            "transcript_99999999999999999999999.txt",
        ] {
            std::fs::write(transcripts.join(name), "x").unwrap();
        }

        let mut ledger = ArtifactLedger::new(dir.path(), "transcripts", "dataset.csv");
        ledger.refresh();
        assert_eq!(ledger.next_transcript_name(), "transcript_3.txt");
        assert_eq!(ledger.saved_transcripts.len(), 3);
    }
}
