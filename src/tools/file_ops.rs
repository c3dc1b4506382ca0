use super::scanner::{self, ScanResult};
use super::ToolExecutor;
use crate::state::file_context_marker;
use crate::types::ToolCall;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

const BATCH_SEPARATOR_WIDTH: usize = 50;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FileToCreate {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
struct FileOperationArgs {
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    file_paths: Option<Vec<String>>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    files: Option<Vec<FileToCreate>>,
    #[serde(default)]
    original_snippet: Option<String>,
    #[serde(default)]
    new_snippet: Option<String>,
}

fn required<T>(value: Option<T>, tool: &str, field: &str) -> Result<T> {
    value.with_context(|| format!("{tool} requires a '{field}' field"))
}

/// File tools confined to one working directory.
pub struct FileOperations {
    working_dir: PathBuf,
    canonical_working_dir: PathBuf,
    max_file_size_bytes: u64,
}

impl FileOperations {
    pub fn new(working_dir: PathBuf, max_file_size_mb: u64) -> Self {
        let canonical_working_dir =
            fs::canonicalize(&working_dir).unwrap_or_else(|_| working_dir.clone());
        Self {
            working_dir,
            canonical_working_dir,
            max_file_size_bytes: max_file_size_mb.saturating_mul(1024 * 1024),
        }
    }

    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        let path = path.trim();
        if path.is_empty() {
            bail!("Path cannot be empty");
        }
        if path.contains('\\') {
            bail!("Security error: platform-specific path not allowed: {path}");
        }

        let requested = Path::new(path);
        for component in requested.components() {
            if matches!(component, Component::ParentDir) {
                bail!("Security error: path traversal detected: {path}");
            }
        }

        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.working_dir.join(requested)
        };
        let normalized = normalize_path(&joined);
        self.ensure_path_is_within_workspace(&normalized)?;

        Ok(normalized)
    }

    fn ensure_path_is_within_workspace(&self, path: &Path) -> Result<()> {
        let guard_path = if path.exists() {
            path.to_path_buf()
        } else {
            nearest_existing_ancestor(path)
                .context("Security error: could not find an existing parent path")?
                .to_path_buf()
        };

        let canonical_guard = fs::canonicalize(&guard_path)
            .with_context(|| format!("Failed to canonicalize {}", guard_path.display()))?;
        if !canonical_guard.starts_with(&self.canonical_working_dir) {
            bail!(
                "Security error: path escapes working directory: {}",
                path.display()
            );
        }
        Ok(())
    }

    fn display_path(&self, resolved: &Path) -> String {
        resolved
            .strip_prefix(&self.working_dir)
            .map(|relative| relative.to_string_lossy().to_string())
            .unwrap_or_else(|_| resolved.to_string_lossy().to_string())
    }

    /// Workspace-relative form of `path`, the key used for context de-duplication.
    pub fn context_path(&self, path: &str) -> Result<String> {
        let resolved = self.resolve_path(path)?;
        Ok(self.display_path(&resolved))
    }

    pub fn is_directory(&self, path: &str) -> Result<bool> {
        Ok(self.resolve_path(path)?.is_dir())
    }

    /// Scans a workspace directory for files eligible as context. Returned paths are
    /// workspace-relative.
    pub fn scan_directory(&self, path: &str) -> Result<ScanResult> {
        let resolved = self.resolve_path(path)?;
        let mut result = scanner::scan_directory(&resolved, self.max_file_size_bytes)?;
        for added in &mut result.added {
            *added = PathBuf::from(self.display_path(added));
        }
        for (skipped, _) in &mut result.skipped {
            *skipped = PathBuf::from(self.display_path(skipped));
        }
        Ok(result)
    }

    fn read_resolved(&self, resolved: &Path) -> Result<String> {
        if resolved.is_dir() {
            bail!("'{}' is a directory", self.display_path(resolved));
        }
        let size = fs::metadata(resolved)
            .with_context(|| format!("Failed to read {}", self.display_path(resolved)))?
            .len();
        if size > self.max_file_size_bytes {
            bail!(
                "'{}' exceeds the {}MB size limit",
                self.display_path(resolved),
                self.max_file_size_bytes / (1024 * 1024)
            );
        }
        fs::read_to_string(resolved)
            .with_context(|| format!("Failed to read {}", self.display_path(resolved)))
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        let resolved = self.resolve_path(path)?;
        let content = self.read_resolved(&resolved)?;
        Ok(format!(
            "{}:\n\n{content}",
            file_context_marker(&self.display_path(&resolved))
        ))
    }

    /// Reads every path, reporting per-file failures inline instead of failing the batch.
    pub fn read_multiple_files(&self, paths: &[String]) -> Result<String> {
        if paths.is_empty() {
            bail!("read_multiple_files requires at least one path");
        }
        let separator = "=".repeat(BATCH_SEPARATOR_WIDTH);
        let sections: Vec<String> = paths
            .iter()
            .map(|path| {
                self.read_file(path)
                    .unwrap_or_else(|error| format!("Error reading '{path}': {error}"))
            })
            .collect();

        Ok(format!(
            "\n\n{separator}\n\n{}",
            sections.join(&format!("\n\n{separator}\n\n"))
        ))
    }

    pub fn read_file_for_context(&self, path: &str) -> Result<String> {
        self.read_file(path)
    }

    pub fn create_file(&self, path: &str, content: &str) -> Result<String> {
        let resolved = self.resolve_path(path)?;
        if content.len() as u64 > self.max_file_size_bytes {
            bail!(
                "file content exceeds {}MB size limit",
                self.max_file_size_bytes / (1024 * 1024)
            );
        }
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).context("Failed to create parent directory")?;
        }
        fs::write(&resolved, content).context("Failed to write file")?;
        Ok(format!(
            "Successfully created file '{}'",
            self.display_path(&resolved)
        ))
    }

    /// Stops at the first failure; files written before it stay written.
    pub fn create_multiple_files(&self, files: &[FileToCreate]) -> Result<String> {
        if files.is_empty() {
            bail!("create_multiple_files requires at least one file");
        }
        let mut created = Vec::with_capacity(files.len());
        for file in files {
            self.create_file(&file.path, &file.content)
                .with_context(|| format!("creating file '{}'", file.path))?;
            created.push(file.path.as_str());
        }
        Ok(format!(
            "Successfully created {} files: {}",
            created.len(),
            created.join(", ")
        ))
    }

    pub fn edit_file(&self, path: &str, original_snippet: &str, new_snippet: &str) -> Result<String> {
        let resolved = self.resolve_path(path)?;
        let content = self.read_resolved(&resolved)?;

        if original_snippet.is_empty() {
            bail!("edit_file requires a non-empty original_snippet");
        }

        let occurrences = content.matches(original_snippet).count();
        if occurrences == 0 {
            bail!("original snippet not found in file");
        }
        if occurrences > 1 {
            bail!("ambiguous edit: {occurrences} matches found for the snippet; it must be unique");
        }

        let updated = content.replacen(original_snippet, new_snippet, 1);
        fs::write(&resolved, updated).context("Failed to edit file")?;
        Ok(format!(
            "Successfully edited file '{}'",
            self.display_path(&resolved)
        ))
    }
}

impl ToolExecutor for FileOperations {
    fn execute(&self, call: &ToolCall) -> Result<String> {
        let name = call.function.name.as_str();
        let arguments = call.function.arguments.trim();
        let args: FileOperationArgs = if arguments.is_empty() {
            FileOperationArgs::default()
        } else {
            serde_json::from_str(arguments).context("parsing arguments")?
        };

        match name {
            "read_file" => self.read_file(&required(args.file_path, name, "file_path")?),
            "read_multiple_files" => {
                self.read_multiple_files(&required(args.file_paths, name, "file_paths")?)
            }
            "create_file" => self.create_file(
                &required(args.file_path, name, "file_path")?,
                &required(args.content, name, "content")?,
            ),
            "create_multiple_files" => {
                self.create_multiple_files(&required(args.files, name, "files")?)
            }
            "edit_file" => self.edit_file(
                &required(args.file_path, name, "file_path")?,
                &required(args.original_snippet, name, "original_snippet")?,
                &required(args.new_snippet, name, "new_snippet")?,
            ),
            other => bail!("unknown function: {other}"),
        }
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<&Path> {
    let mut current = path;
    while !current.exists() {
        current = current.parent()?;
    }
    Some(current)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(seg) => out.push(seg),
            Component::RootDir => out.push(component.as_os_str()),
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
        }
    }
    out
}
