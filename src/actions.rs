//! Side effects behind result items: clipboard, opening files, audio.
//!
//! On Linux the clipboard goes through xclip first: it forks and keeps
//! serving the selection after this process exits. arboard is the fallback
//! there and the only backend elsewhere.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::error::{PluginError, Result};

pub const SCRATCH_FILE: &str = "temp_text.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Xclip,
    Arboard,
}

impl Backend {
    fn copy(self, text: &str) -> std::result::Result<(), String> {
        match self {
            Self::Xclip => copy_with_xclip(text),
            Self::Arboard => copy_with_arboard(text),
        }
    }
}

fn backends() -> &'static [Backend] {
    if cfg!(target_os = "linux") {
        &[Backend::Xclip, Backend::Arboard]
    } else {
        &[Backend::Arboard]
    }
}

/// Put text on the system clipboard.
pub fn copy_text(text: &str) -> Result<()> {
    let mut last_error = String::from("no clipboard backend");
    for &backend in backends() {
        match backend.copy(text) {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("{backend:?} clipboard failed: {e}");
                last_error = e;
            }
        }
    }
    Err(PluginError::Clipboard(last_error))
}

fn copy_with_arboard(text: &str) -> std::result::Result<(), String> {
    let mut clipboard = arboard::Clipboard::new().map_err(|e| format!("Failed to open clipboard: {e}"))?;

    // X11/Wayland selections die with their owner; hold it until replaced.
    #[cfg(target_os = "linux")]
    {
        use arboard::SetExtLinux;
        clipboard
            .set()
            .wait()
            .text(text)
            .map_err(|e| format!("Failed to set clipboard: {e}"))?;
    }
    #[cfg(not(target_os = "linux"))]
    clipboard
        .set_text(text)
        .map_err(|e| format!("Failed to set clipboard: {e}"))?;

    debug!("Copied {} characters via arboard", text.chars().count());
    Ok(())
}

fn copy_with_xclip(text: &str) -> std::result::Result<(), String> {
    let mut child = Command::new("xclip")
        .args(["-selection", "clipboard"])
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to spawn xclip: {e}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .map_err(|e| format!("Failed to write to xclip: {e}"))?;
    }
    let status = child.wait().map_err(|e| format!("xclip failed: {e}"))?;
    if !status.success() {
        return Err("xclip exited with non-zero status".to_string());
    }

    debug!("Copied via xclip");
    Ok(())
}

fn opener() -> (&'static str, &'static [&'static str]) {
    if cfg!(target_os = "windows") {
        ("cmd", &["/C", "start", ""])
    } else if cfg!(target_os = "macos") {
        ("open", &[])
    } else {
        ("xdg-open", &[])
    }
}

/// Open a file or folder with the desktop's default handler.
pub fn open_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(PluginError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "path does not exist"),
        ));
    }

    let (program, args) = opener();
    Command::new(program)
        .args(args)
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| PluginError::io(path, e))?;

    debug!("Opened {} with {program}", path.display());
    Ok(())
}

/// Write text to the scratch file in `dir`, returning its path.
pub fn write_scratch(dir: &Path, text: &str) -> Result<PathBuf> {
    let path = dir.join(SCRATCH_FILE);
    std::fs::write(&path, text).map_err(|e| PluginError::io(&path, e))?;
    Ok(path)
}

/// First line of `text`, cut to `max` characters with a trailing "...".
pub fn ellipsis(text: &str, max: usize) -> String {
    let line = text.split('\n').next().unwrap_or("");
    if line.chars().count() <= max {
        return line.to_string();
    }
    let kept: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ellipsis_keeps_short_first_line() {
        assert_eq!(ellipsis("short\nsecond line", 20), "short");
    }

    #[test]
    fn ellipsis_truncates_long_line() {
        assert_eq!(ellipsis("abcdefghij", 8), "abcde...");
        assert_eq!(ellipsis("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn scratch_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        write_scratch(dir.path(), "first").unwrap();
        let path = write_scratch(dir.path(), "second").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "second");
    }

    #[test]
    fn arboard_is_always_the_last_resort() {
        assert_eq!(backends().last(), Some(&Backend::Arboard));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_prefers_a_clipboard_owner_that_outlives_the_process() {
        assert_eq!(backends(), &[Backend::Xclip, Backend::Arboard]);
    }

    #[test]
    fn opening_missing_path_fails_without_spawning() {
        let result = open_path(Path::new("/definitely/not/here.txt"));
        assert!(matches!(result, Err(PluginError::Io { .. })));
    }
}
