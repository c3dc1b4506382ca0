mod file_ops;
mod scanner;

pub use file_ops::{FileOperations, FileToCreate};
pub use scanner::{ScanResult, SkipReason, MAX_FILES_PER_SCAN};

use crate::types::ToolCall;
use anyhow::Result;

pub const TOOL_NAMES: [&str; 5] = [
    "read_file",
    "read_multiple_files",
    "create_file",
    "create_multiple_files",
    "edit_file",
];

/// Runs one model-requested tool call and returns its textual result.
///
/// Implementations must not panic on bad input; malformed arguments are an `Err`.
pub trait ToolExecutor: Send + Sync {
    fn execute(&self, call: &ToolCall) -> Result<String>;
}
