// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use tracing::debug;

/// Files beyond this size are refused by `get_file_content`.
const READ_LIMIT_BYTES: u64 = 100 * 1024;

const EXCLUDED_NAMES: &[&str] = &["node_modules", "vendor", "__pycache__"];

const ESCAPE_ERROR: &str = "Error: Invalid path - must be relative within source directory";

/// Filesystem tools rooted at a single configured directory. Both operations
/// apply the same path-resolution policy: a textual check that rejects an
/// obviously escaping path (leading `..`, an absolute prefix) followed by a
/// post-resolution prefix check against the canonicalized root — the
/// textual check short-circuits obvious attacks, the prefix check catches
/// symlink-resolved escapes. Both layers are kept deliberately.
pub struct SandboxFs {
    root: PathBuf,
}

impl SandboxFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Textually normalize `input` (collapsing `.`/`..` segments) and join it
    /// with the root, without touching the filesystem. Returns `None` if the
    /// normalized path escapes the root or is itself absolute.
    fn lexical_join(&self, input: &str) -> Option<PathBuf> {
        if input.starts_with('/') {
            return None;
        }
        let mut stack: Vec<&str> = Vec::new();
        for seg in input.split('/') {
            match seg {
                "" | "." => continue,
                ".." => {
                    if stack.is_empty() {
                        return None;
                    }
                    stack.pop();
                }
                other => stack.push(other),
            }
        }
        let mut joined = self.root.clone();
        for seg in stack {
            joined.push(seg);
        }
        Some(joined)
    }

    /// Resolve `input` to an absolute path guaranteed to live under the
    /// root, re-checking via canonicalization when the target exists (this
    /// is what catches a symlink that textually looked fine but resolves
    /// outside the root).
    fn resolve(&self, input: &str) -> Result<PathBuf, ()> {
        let candidate = self.lexical_join(input).ok_or(())?;

        if candidate.exists() {
            let canonical_root = self.root.canonicalize().map_err(|_| ())?;
            let canonical_candidate = candidate.canonicalize().map_err(|_| ())?;
            if !canonical_candidate.starts_with(&canonical_root) {
                return Err(());
            }
            Ok(canonical_candidate)
        } else {
            // Nothing to canonicalize; the lexical join already proved the
            // path cannot escape the root (no `..` survives above the root).
            Ok(candidate)
        }
    }

    /// List the immediate children of `path` (`.` means the sandbox root).
    pub fn list_files(&self, path: &str) -> String {
        let dir = if path == "." {
            self.root.clone()
        } else {
            match self.resolve(path) {
                Ok(p) => p,
                Err(()) => return ESCAPE_ERROR.to_string(),
            }
        };

        debug!(path = %dir.display(), "sandbox list_files");

        let entries = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) => return format!("Error: {e}"),
        };

        let mut names: Vec<String> = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || EXCLUDED_NAMES.contains(&name.as_str()) {
                continue;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                names.push(format!("{name}/"));
            } else {
                names.push(name);
            }
        }

        if names.is_empty() {
            return "Directory is empty or contains only hidden files".to_string();
        }

        names.sort();
        names.join("\n")
    }

    /// Read a file's bytes as text, subject to the size cap.
    pub fn get_file_content(&self, path: &str) -> String {
        let resolved = match self.resolve(path) {
            Ok(p) => p,
            Err(()) => return ESCAPE_ERROR.to_string(),
        };

        debug!(path = %resolved.display(), "sandbox get_file_content");

        let metadata = match std::fs::metadata(&resolved) {
            Ok(m) => m,
            Err(_) => return "Error: file does not exist".to_string(),
        };

        if metadata.is_dir() {
            return "Error: path is a directory".to_string();
        }

        if metadata.len() > READ_LIMIT_BYTES {
            return format!(
                "Error: file exceeds {READ_LIMIT_BYTES} byte limit ({} bytes)",
                metadata.len()
            );
        }

        match std::fs::read(&resolved) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => format!("Error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_with(files: &[(&str, &str)]) -> (tempfile::TempDir, SandboxFs) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let p = dir.path().join(name);
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(p, content).unwrap();
        }
        let root = dir.path().to_path_buf();
        (dir, SandboxFs::new(root))
    }

    #[test]
    fn list_files_root_via_dot() {
        let (_dir, fs) = sandbox_with(&[("a.txt", "x"), ("b.txt", "y")]);
        let out = fs.list_files(".");
        assert!(out.contains("a.txt"));
        assert!(out.contains("b.txt"));
    }

    #[test]
    fn list_files_directories_have_trailing_slash() {
        let (_dir, fs) = sandbox_with(&[("sub/file.txt", "x")]);
        let out = fs.list_files(".");
        assert!(out.contains("sub/"));
    }

    #[test]
    fn list_files_excludes_dotfiles_and_vendor_dirs() {
        let (_dir, fs) = sandbox_with(&[
            (".hidden", "x"),
            ("node_modules/pkg.js", "x"),
            ("vendor/lib.go", "x"),
            ("__pycache__/x.pyc", "x"),
            ("visible.txt", "x"),
        ]);
        let out = fs.list_files(".");
        assert!(!out.contains(".hidden"));
        assert!(!out.contains("node_modules"));
        assert!(!out.contains("vendor"));
        assert!(!out.contains("__pycache__"));
        assert!(out.contains("visible.txt"));
    }

    #[test]
    fn list_files_empty_root_reports_empty_message() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SandboxFs::new(dir.path().to_path_buf());
        assert_eq!(
            fs.list_files("."),
            "Directory is empty or contains only hidden files"
        );
    }

    #[test]
    fn list_files_only_hidden_reports_empty_message() {
        let (_dir, fs) = sandbox_with(&[(".only-hidden", "x")]);
        assert_eq!(
            fs.list_files("."),
            "Directory is empty or contains only hidden files"
        );
    }

    #[test]
    fn get_file_content_reads_existing_file() {
        let (_dir, fs) = sandbox_with(&[("checkout/Button.tsx", "export const Button = () => {}")]);
        let out = fs.get_file_content("checkout/Button.tsx");
        assert_eq!(out, "export const Button = () => {}");
    }

    #[test]
    fn get_file_content_path_escape_is_rejected() {
        let (_dir, fs) = sandbox_with(&[("a.txt", "x")]);
        let out = fs.get_file_content("../../etc/passwd");
        assert_eq!(out, ESCAPE_ERROR);
    }

    #[test]
    fn get_file_content_absolute_path_is_rejected() {
        let (_dir, fs) = sandbox_with(&[("a.txt", "x")]);
        let out = fs.get_file_content("/etc/passwd");
        assert_eq!(out, ESCAPE_ERROR);
    }

    #[test]
    fn get_file_content_missing_file_errors() {
        let (_dir, fs) = sandbox_with(&[]);
        let out = fs.get_file_content("nope.txt");
        assert!(out.starts_with("Error:"));
    }

    #[test]
    fn get_file_content_directory_errors() {
        let (_dir, fs) = sandbox_with(&[("sub/file.txt", "x")]);
        let out = fs.get_file_content("sub");
        assert!(out.starts_with("Error:"));
    }

    #[test]
    fn get_file_content_exactly_at_limit_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let content = "a".repeat(READ_LIMIT_BYTES as usize);
        std::fs::write(dir.path().join("big.txt"), &content).unwrap();
        let fs = SandboxFs::new(dir.path().to_path_buf());
        let out = fs.get_file_content("big.txt");
        assert_eq!(out.len(), READ_LIMIT_BYTES as usize);
    }

    #[test]
    fn get_file_content_one_byte_over_limit_errors() {
        let dir = tempfile::tempdir().unwrap();
        let content = "a".repeat(READ_LIMIT_BYTES as usize + 1);
        std::fs::write(dir.path().join("big.txt"), &content).unwrap();
        let fs = SandboxFs::new(dir.path().to_path_buf());
        let out = fs.get_file_content("big.txt");
        assert!(out.starts_with("Error:"));
        assert!(out.contains("exceeds"));
    }

    #[test]
    fn trailing_slash_inputs_resolve_the_same() {
        let (_dir, fs) = sandbox_with(&[("checkout/Button.tsx", "x")]);
        let a = fs.get_file_content("checkout/Button.tsx");
        let b = fs.get_file_content("checkout//Button.tsx");
        assert_eq!(a, b);
    }

    #[test]
    fn dotdot_that_stays_within_root_is_allowed() {
        let (_dir, fs) = sandbox_with(&[("a/b/file.txt", "x")]);
        let out = fs.get_file_content("a/b/../b/file.txt");
        assert_eq!(out, "x");
    }
}
