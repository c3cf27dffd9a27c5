//! Best-effort lookup of a session's transcript file.
//!
//! Codex writes one JSONL transcript per session under
//! `sessions/YYYY/MM/DD/`, with the session id embedded in the file name.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use tracing::{debug, instrument};

/// Directory levels below the root that the fallback search descends into.
pub const MAX_SEARCH_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLocator {
    root: PathBuf,
}

impl TranscriptLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locator rooted at `sessions_dir`, or at the agent's default session tree.
    pub fn from_env(sessions_dir: Option<PathBuf>) -> Self {
        Self::new(sessions_dir.unwrap_or_else(default_sessions_root))
    }

    /// Return the transcript path for `session_id`.
    ///
    /// Without a session id this is empty and touches nothing. When no file
    /// matches, the root directory itself is returned.
    #[instrument(skip_all, fields(session_id = ?session_id))]
    pub fn locate(&self, session_id: Option<&str>, today: NaiveDate) -> String {
        let Some(session_id) = session_id else {
            return String::new();
        };

        let dated = self.dated_dir(today);
        if let Some(found) = find_in_dir(&dated, session_id) {
            debug!(path = %found.display(), "transcript found in dated directory");
            return found.display().to_string();
        }
        if let Some(found) = self.search(session_id) {
            debug!(path = %found.display(), "transcript found by search");
            return found.display().to_string();
        }
        debug!(root = %self.root.display(), "transcript not found");
        self.root.display().to_string()
    }

    fn dated_dir(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()))
    }

    /// Depth-bounded search with an explicit stack; symlinked directories are
    /// not followed.
    fn search(&self, session_id: &str) -> Option<PathBuf> {
        let mut stack = vec![(self.root.clone(), 0usize)];
        while let Some((dir, depth)) = stack.pop() {
            let entries = sorted_entries(&dir);
            let mut subdirs = Vec::new();
            for (path, is_dir) in entries {
                if is_dir {
                    if depth < MAX_SEARCH_DEPTH {
                        subdirs.push((path, depth + 1));
                    }
                } else if matches_session(&path, session_id) {
                    return Some(path);
                }
            }
            // Reverse so the stack pops subdirectories in name order.
            stack.extend(subdirs.into_iter().rev());
        }
        None
    }
}

/// `$CODEX_HOME/sessions`, else `~/.codex/sessions`.
pub fn default_sessions_root() -> PathBuf {
    if let Some(home) = std::env::var_os("CODEX_HOME").filter(|value| !value.is_empty()) {
        return PathBuf::from(home).join("sessions");
    }
    dirs::home_dir()
        .unwrap_or_default()
        .join(".codex")
        .join("sessions")
}

fn find_in_dir(dir: &Path, session_id: &str) -> Option<PathBuf> {
    sorted_entries(dir)
        .into_iter()
        .find(|(path, is_dir)| !is_dir && matches_session(path, session_id))
        .map(|(path, _)| path)
}

fn matches_session(path: &Path, session_id: &str) -> bool {
    path.is_file()
        && path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().contains(session_id))
}

/// Directory entries sorted by name, paired with "is a real directory".
fn sorted_entries(dir: &Path) -> Vec<(PathBuf, bool)> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(err) => {
            debug!(dir = %dir.display(), err = %err, "skip unreadable directory");
            return Vec::new();
        }
    };
    let mut entries: Vec<(PathBuf, bool)> = read
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
            (entry.path(), is_dir)
        })
        .collect();
    entries.sort();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).expect("date")
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, "{}\n").expect("write");
    }

    #[test]
    fn missing_session_id_returns_empty_without_search() {
        let locator = TranscriptLocator::new("/definitely/not/here");
        assert_eq!(locator.locate(None, date()), "");
    }

    #[test]
    fn finds_file_in_todays_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp
            .path()
            .join("2025/03/07/rollout-2025-03-07T10-00-00-sess-42.jsonl");
        touch(&file);
        touch(&temp.path().join("2025/03/07/rollout-other.jsonl"));

        let locator = TranscriptLocator::new(temp.path());
        assert_eq!(
            locator.locate(Some("sess-42"), date()),
            file.display().to_string()
        );
    }

    #[test]
    fn falls_back_to_search_for_older_sessions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("2024/12/31/rollout-sess-7.jsonl");
        touch(&file);

        let locator = TranscriptLocator::new(temp.path());
        assert_eq!(
            locator.locate(Some("sess-7"), date()),
            file.display().to_string()
        );
    }

    #[test]
    fn search_stops_at_depth_bound() {
        let temp = tempfile::tempdir().expect("tempdir");
        touch(&temp.path().join("a/b/c/d/e/rollout-deep.jsonl"));

        let locator = TranscriptLocator::new(temp.path());
        assert_eq!(
            locator.locate(Some("deep"), date()),
            temp.path().display().to_string()
        );
    }

    #[test]
    fn file_at_maximum_depth_is_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("a/b/c/d/rollout-edge.jsonl");
        touch(&file);

        let locator = TranscriptLocator::new(temp.path());
        assert_eq!(
            locator.locate(Some("edge"), date()),
            file.display().to_string()
        );
    }

    #[test]
    fn unmatched_session_returns_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        touch(&temp.path().join("2025/03/07/rollout-else.jsonl"));

        let locator = TranscriptLocator::new(temp.path());
        assert_eq!(
            locator.locate(Some("nope"), date()),
            temp.path().display().to_string()
        );
    }

    #[test]
    fn missing_root_returns_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("absent");
        let locator = TranscriptLocator::new(&root);
        assert_eq!(
            locator.locate(Some("x"), date()),
            root.display().to_string()
        );
    }

    #[test]
    fn directories_matching_the_id_are_not_transcripts() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("2025/03/07/sess-dir")).expect("mkdir");
        let file = temp.path().join("2025/03/07/sess-dir/inner-sess-dir.jsonl");
        touch(&file);

        let locator = TranscriptLocator::new(temp.path());
        assert_eq!(
            locator.locate(Some("sess-dir"), date()),
            file.display().to_string()
        );
    }
}
