use anyhow::{bail, Context, Result};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

pub const MAX_FILES_PER_SCAN: usize = 1000;
const BINARY_PEEK_SIZE: usize = 1024;
const NON_PRINTABLE_RATIO_LIMIT: f64 = 0.3;

const EXCLUDED_NAMES: &[&str] = &[
    ".DS_Store", "Thumbs.db", ".gitignore", ".python-version", "uv.lock", ".uv", "uvenv",
    ".uvenv", ".venv", "venv", "__pycache__", ".pytest_cache", ".coverage", ".mypy_cache",
    "node_modules", "package-lock.json", "yarn.lock", "pnpm-lock.yaml", ".next", ".nuxt", "dist",
    "build", ".cache", ".parcel-cache", ".turbo", ".vercel", ".output", ".contentlayer", "out",
    "coverage", ".nyc_output", "storybook-static", ".env", ".env.local", ".env.development",
    ".env.production", ".git", ".svn", ".hg", "CVS", "vendor", "go.sum", "target", "Cargo.lock",
];

/// Matched against the end of the lowercased file name, so compound suffixes like `.min.js` work.
const EXCLUDED_SUFFIXES: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".ico", ".svg", ".webp", ".avif", ".mp4", ".webm", ".mov",
    ".mp3", ".wav", ".ogg", ".zip", ".tar", ".gz", ".7z", ".rar", ".exe", ".dll", ".so",
    ".dylib", ".bin", ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".pyc", ".pyo",
    ".pyd", ".egg", ".whl", ".db", ".sqlite", ".sqlite3", ".log", ".map", ".min.js", ".min.css",
    ".bundle.js", ".bundle.css", ".chunk.js", ".chunk.css", ".tmp", ".temp", ".ttf", ".otf",
    ".woff", ".woff2", ".eot",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Hidden,
    Excluded,
    ExcludedExtension,
    TooLarge,
    Binary,
    Symlink,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Hidden => "hidden",
            SkipReason::Excluded => "excluded",
            SkipReason::ExcludedExtension => "excluded extension",
            SkipReason::TooLarge => "exceeds size limit",
            SkipReason::Binary => "binary file",
            SkipReason::Symlink => "symlink",
        };
        f.write_str(text)
    }
}

/// Files found under a directory, split into eligible and skipped. Paths are joined onto the
/// scanned root.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub added: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
    pub errors: Vec<String>,
    pub total_scanned: usize,
}

/// Walks `root` depth-first in name order, collecting text files small enough to inject.
pub fn scan_directory(root: &Path, max_file_size_bytes: u64) -> Result<ScanResult> {
    let metadata = fs::metadata(root)
        .with_context(|| format!("Failed to access {}", root.display()))?;
    if !metadata.is_dir() {
        bail!("'{}' is not a directory", root.display());
    }

    let mut result = ScanResult::default();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries: Vec<PathBuf> = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .collect(),
            Err(error) => {
                result.errors.push(format!("{}: {error}", dir.display()));
                continue;
            }
        };
        entries.sort();

        let mut subdirs = Vec::new();
        for path in entries {
            if result.total_scanned >= MAX_FILES_PER_SCAN {
                tracing::warn!(root = %root.display(), "directory scan hit the file limit");
                return Ok(result);
            }
            match classify(&path, max_file_size_bytes) {
                Ok(Entry::Directory) => subdirs.push(path),
                Ok(Entry::SkippedDirectory(reason)) => result.skipped.push((path, reason)),
                Ok(Entry::File(verdict)) => {
                    result.total_scanned += 1;
                    match verdict {
                        None => result.added.push(path),
                        Some(reason) => result.skipped.push((path, reason)),
                    }
                }
                Err(error) => result.errors.push(format!("{}: {error:#}", path.display())),
            }
        }
        // Reversed so the stack pops directories in name order.
        pending.extend(subdirs.into_iter().rev());
    }

    Ok(result)
}

enum Entry {
    Directory,
    SkippedDirectory(SkipReason),
    File(Option<SkipReason>),
}

fn classify(path: &Path, max_file_size_bytes: u64) -> Result<Entry> {
    let metadata = fs::symlink_metadata(path)?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    if metadata.file_type().is_symlink() {
        return Ok(Entry::File(Some(SkipReason::Symlink)));
    }
    if metadata.is_dir() {
        if name.starts_with('.') {
            return Ok(Entry::SkippedDirectory(SkipReason::Hidden));
        }
        if EXCLUDED_NAMES.contains(&name.as_str()) {
            return Ok(Entry::SkippedDirectory(SkipReason::Excluded));
        }
        return Ok(Entry::Directory);
    }

    if name.starts_with('.') {
        return Ok(Entry::File(Some(SkipReason::Hidden)));
    }
    if EXCLUDED_NAMES.contains(&name.as_str()) {
        return Ok(Entry::File(Some(SkipReason::Excluded)));
    }
    let lower = name.to_ascii_lowercase();
    if EXCLUDED_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) {
        return Ok(Entry::File(Some(SkipReason::ExcludedExtension)));
    }
    if metadata.len() > max_file_size_bytes {
        return Ok(Entry::File(Some(SkipReason::TooLarge)));
    }
    if is_binary_file(path)? {
        return Ok(Entry::File(Some(SkipReason::Binary)));
    }
    Ok(Entry::File(None))
}

/// Sniffs the first bytes for NUL, executable or archive magic, or mostly control characters.
fn is_binary_file(path: &Path) -> Result<bool> {
    let mut buffer = [0u8; BINARY_PEEK_SIZE];
    let read = File::open(path)?.read(&mut buffer)?;
    Ok(looks_binary(&buffer[..read]))
}

fn looks_binary(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    if let &[a, b, c, d, ..] = sample {
        let magic = [a, b, c, d];
        let executable_or_archive = magic == [0x7f, b'E', b'L', b'F']
            || [a, b] == [b'M', b'Z']
            || magic == [0xfe, 0xed, 0xfa, 0xce]
            || magic == [0xfe, 0xed, 0xfa, 0xcf]
            || magic == [0xce, 0xfa, 0xed, 0xfe]
            || (a == b'P' && b == b'K' && (c == 0x03 || c == 0x05));
        if executable_or_archive {
            return true;
        }
    }

    let non_printable = sample
        .iter()
        .filter(|&&byte| {
            (byte < 32 && !matches!(byte, b'\t' | b'\n' | b'\r')) || (127..160).contains(&byte)
        })
        .count();
    non_printable as f64 / sample.len() as f64 > NON_PRINTABLE_RATIO_LIMIT
}
