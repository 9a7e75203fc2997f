//! Per-keyword conversation log, newest entry first.

use chrono::{DateTime, Local};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct Exchange<'a> {
    pub keyword: &'a str,
    pub prompt: &'a str,
    pub prompt_time: DateTime<Local>,
    pub answer: &'a str,
    pub answer_time: DateTime<Local>,
}

impl Exchange<'_> {
    fn render(&self) -> String {
        format!(
            "[{}] User: {}\n[{}] Gemini: {}\n\n",
            self.prompt_time.format(TIMESTAMP_FORMAT),
            self.prompt,
            self.answer_time.format(TIMESTAMP_FORMAT),
            self.answer
        )
    }
}

pub fn log_path(dir: &Path, keyword: &str) -> PathBuf {
    dir.join(format!("Conversations '{keyword}' keyword.txt"))
}

/// Prepend an exchange to the keyword's log file in `dir`.
///
/// Returns the file path, or `None` if the log could not be updated. An
/// existing file that cannot be read is left untouched.
pub fn save(dir: &Path, exchange: &Exchange<'_>) -> Option<PathBuf> {
    let path = log_path(dir, exchange.keyword);

    let existing = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => {
            error!("Failed to read conversation log {}: {e}", path.display());
            return None;
        }
    };

    let mut contents = exchange.render();
    contents.push_str(&existing);

    match fs::write(&path, contents) {
        Ok(()) => {
            debug!("Saved conversation to {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("Failed to write conversation log {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, h, m, s).unwrap()
    }

    #[test]
    fn entry_format() {
        let dir = tempfile::tempdir().unwrap();
        let exchange = Exchange {
            keyword: "tr",
            prompt: "bonjour",
            prompt_time: at(8, 5, 1),
            answer: "hello",
            answer_time: at(8, 5, 3),
        };

        let path = save(dir.path(), &exchange).unwrap();
        assert_eq!(path.file_name().unwrap(), "Conversations 'tr' keyword.txt");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[2024-03-09 08:05:01] User: bonjour\n[2024-03-09 08:05:03] Gemini: hello\n\n"
        );
    }

    #[test]
    fn newer_entries_come_first() {
        let dir = tempfile::tempdir().unwrap();
        let first = Exchange {
            keyword: "default",
            prompt: "one",
            prompt_time: at(9, 0, 0),
            answer: "1",
            answer_time: at(9, 0, 1),
        };
        let second = Exchange {
            prompt: "two",
            answer: "2",
            prompt_time: at(10, 0, 0),
            answer_time: at(10, 0, 1),
            ..first.clone()
        };

        save(dir.path(), &first).unwrap();
        let path = save(dir.path(), &second).unwrap();

        let contents = fs::read_to_string(path).unwrap();
        let two = contents.find("User: two").unwrap();
        let one = contents.find("User: one").unwrap();
        assert!(two < one);
        assert!(contents.ends_with("Gemini: 1\n\n"));
    }

    #[test]
    fn unwritable_directory_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let exchange = Exchange {
            keyword: "k",
            prompt: "p",
            prompt_time: at(1, 0, 0),
            answer: "a",
            answer_time: at(1, 0, 0),
        };
        assert!(save(&missing, &exchange).is_none());
    }

    #[test]
    fn unreadable_log_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(dir.path(), "k");
        let original = [0xff, 0xfe, b'o', b'l', b'd'];
        fs::write(&path, original).unwrap();

        let exchange = Exchange {
            keyword: "k",
            prompt: "p",
            prompt_time: at(1, 0, 0),
            answer: "a",
            answer_time: at(1, 0, 0),
        };
        assert!(save(dir.path(), &exchange).is_none());
        assert_eq!(fs::read(&path).unwrap(), original);
    }
}
