//! Vault tool bodies — read/write/grep/tags/backlinks. Out of scope as
//! precise behavior per the source specification, but real enough to
//! exercise path confinement, session isolation, and the commit coordinator
//! end-to-end in tests.
//!
//! Grounded in `rustedclaw-tools`'s `file_read.rs`/`file_write.rs` shape:
//! a JSON-schema'd [`Tool`] impl per operation, validating arguments before
//! touching the filesystem.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use vaultgate_core::error::ToolError;
use vaultgate_core::tool::{Tool, ToolResult};
use vaultgate_security::{resolve_within_vault_safe, DEFAULT_FORBIDDEN_DIRS};
use vaultgate_vcs::DebouncedCommitCoordinator;

fn resolve(vault_root: &std::path::Path, user_path: &str) -> Result<PathBuf, ToolError> {
    resolve_within_vault_safe(vault_root, user_path, DEFAULT_FORBIDDEN_DIRS)
        .map_err(|e| ToolError::PathEscape(e.to_string()))
}

pub struct ReadTool {
    vault_root: PathBuf,
}

impl ReadTool {
    pub fn new(vault_root: PathBuf) -> Self {
        Self { vault_root }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the contents of a note at the given vault-relative path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Vault-relative path to the note"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'path' argument".into()))?;
        let resolved = resolve(&self.vault_root, path)?;

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => Ok(ToolResult::ok("", content)),
            Err(e) => Ok(ToolResult::err("", format!("failed to read note: {e}"))),
        }
    }
}

pub struct WriteTool {
    vault_root: PathBuf,
    coordinator: Arc<DebouncedCommitCoordinator>,
}

impl WriteTool {
    pub fn new(vault_root: PathBuf, coordinator: Arc<DebouncedCommitCoordinator>) -> Self {
        Self {
            vault_root,
            coordinator,
        }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Create or overwrite a note at the given vault-relative path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Vault-relative path to the note"},
                "content": {"type": "string", "description": "The note's new contents"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'content' argument".into()))?;
        let resolved = resolve(&self.vault_root, path)?;

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolResult::err("", format!("failed to create parent directory: {e}")));
            }
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(()) => {
                self.coordinator.schedule(format!("update {path}"));
                Ok(ToolResult::ok("", format!("wrote {} bytes to {path}", content.len())))
            }
            Err(e) => Ok(ToolResult::err("", format!("failed to write note: {e}"))),
        }
    }
}

pub struct GrepTool {
    vault_root: PathBuf,
}

impl GrepTool {
    pub fn new(vault_root: PathBuf) -> Self {
        Self { vault_root }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search note contents across the vault for a literal substring."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Literal substring to search for"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'query' argument".into()))?;

        let mut matches = Vec::new();
        for path in markdown_files(&self.vault_root).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "grep".into(),
            reason: e.to_string(),
        })? {
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            for (line_no, line) in content.lines().enumerate() {
                if line.contains(query) {
                    matches.push(format!("{}:{}: {}", path.display(), line_no + 1, line.trim()));
                }
            }
        }

        Ok(ToolResult::ok("", matches.join("\n")).with_data(json!({ "match_count": matches.len() })))
    }
}

pub struct TagsTool {
    vault_root: PathBuf,
}

impl TagsTool {
    pub fn new(vault_root: PathBuf) -> Self {
        Self { vault_root }
    }
}

#[async_trait]
impl Tool for TagsTool {
    fn name(&self) -> &str {
        "tags"
    }

    fn description(&self) -> &str {
        "List every #tag referenced anywhere in the vault."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let mut tags = std::collections::BTreeSet::new();
        for path in markdown_files(&self.vault_root).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "tags".into(),
            reason: e.to_string(),
        })? {
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            for tag in extract_tags(&content) {
                tags.insert(tag);
            }
        }
        let tags: Vec<String> = tags.into_iter().collect();
        Ok(ToolResult::ok("", tags.join(", ")).with_data(json!({ "tags": tags })))
    }
}

pub struct BacklinksTool {
    vault_root: PathBuf,
}

impl BacklinksTool {
    pub fn new(vault_root: PathBuf) -> Self {
        Self { vault_root }
    }
}

#[async_trait]
impl Tool for BacklinksTool {
    fn name(&self) -> &str {
        "backlinks"
    }

    fn description(&self) -> &str {
        "List every note that links to the given note via a [[wikilink]]."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "target": {"type": "string", "description": "Note name referenced inside [[...]] links"}
            },
            "required": ["target"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let target = arguments["target"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'target' argument".into()))?;
        let needle = format!("[[{target}]]");

        let mut backlinks = Vec::new();
        for path in markdown_files(&self.vault_root).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "backlinks".into(),
            reason: e.to_string(),
        })? {
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            if content.contains(&needle) {
                backlinks.push(path.display().to_string());
            }
        }

        Ok(ToolResult::ok("", backlinks.join("\n")).with_data(json!({ "backlinks": backlinks })))
    }
}

fn extract_tags(content: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for word in content.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '#' && c != '/' && c != '-');
        if let Some(tag) = trimmed.strip_prefix('#') {
            if !tag.is_empty() && tag.chars().next().is_some_and(|c| !c.is_numeric()) {
                tags.push(format!("#{tag}"));
            }
        }
    }
    tags
}

/// Recursively walks `root` collecting `.md` files, skipping the reserved
/// directories C2 already refuses to resolve into.
async fn markdown_files(root: &std::path::Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if DEFAULT_FORBIDDEN_DIRS
                    .iter()
                    .any(|d| path.file_name().and_then(|n| n.to_str()) == Some(*d))
                {
                    continue;
                }
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
                out.push(path);
            }
        }
    }
    Ok(out)
}
