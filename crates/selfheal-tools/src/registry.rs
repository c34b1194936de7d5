// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::sandbox::SandboxFs;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct ListFilesTool {
    fs: Arc<SandboxFs>,
}

impl ListFilesTool {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the files and directories at a path relative to the source directory root. \
         Use \".\" for the root. Directories are suffixed with \"/\"."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the source directory root, or \".\" for the root"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(Value::as_str) {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "Error: missing required argument 'path'"),
        };
        ToolOutput::ok(&call.id, self.fs.list_files(path))
    }
}

pub struct GetFileContentTool {
    fs: Arc<SandboxFs>,
}

impl GetFileContentTool {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for GetFileContentTool {
    fn name(&self) -> &str {
        "get_file_content"
    }

    fn description(&self) -> &str {
        "Read the text content of a file at a path relative to the source directory root. \
         Files larger than 100KiB are refused."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the source directory root"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(Value::as_str) {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "Error: missing required argument 'path'"),
        };
        ToolOutput::ok(&call.id, self.fs.get_file_content(path))
    }
}

/// The fixed catalog of tools exposed to the model: `list_files` and
/// `get_file_content`, both backed by the same sandboxed root.
pub struct ToolCatalog {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new(fs: Arc<SandboxFs>) -> Self {
        Self {
            tools: vec![
                Arc::new(ListFilesTool::new(fs.clone())),
                Arc::new(GetFileContentTool::new(fs)),
            ],
        }
    }

    pub fn schemas(&self) -> Vec<(String, String, Value)> {
        self.tools
            .iter()
            .map(|t| (t.name().to_string(), t.description().to_string(), t.parameters_schema()))
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub async fn dispatch(&self, call: ToolCall) -> ToolOutput {
        match self.find(&call.name) {
            Some(tool) => tool.execute(&call).await,
            None => ToolOutput::err(&call.id, format!("Unknown tool: {}", call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog_with(files: &[(&str, &str)]) -> (tempfile::TempDir, ToolCatalog) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let p = dir.path().join(name);
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(p, content).unwrap();
        }
        let fs = Arc::new(SandboxFs::new(dir.path().to_path_buf()));
        (dir, ToolCatalog::new(fs))
    }

    #[tokio::test]
    async fn dispatch_routes_to_correct_tool() {
        let (_dir, catalog) = catalog_with(&[("a.txt", "hello")]);
        let out = catalog
            .dispatch(ToolCall {
                id: "1".into(),
                name: "get_file_content".into(),
                args: json!({"path": "a.txt"}),
            })
            .await;
        assert_eq!(out.content, "hello");
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_is_error() {
        let (_dir, catalog) = catalog_with(&[]);
        let out = catalog
            .dispatch(ToolCall {
                id: "1".into(),
                name: "delete_everything".into(),
                args: json!({}),
            })
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn dispatch_missing_argument_is_error() {
        let (_dir, catalog) = catalog_with(&[]);
        let out = catalog
            .dispatch(ToolCall {
                id: "1".into(),
                name: "list_files".into(),
                args: json!({}),
            })
            .await;
        assert!(out.is_error);
    }

    #[test]
    fn schemas_lists_both_tools() {
        let (_dir, catalog) = catalog_with(&[]);
        let names: Vec<String> = catalog.schemas().into_iter().map(|(n, _, _)| n).collect();
        assert_eq!(names, vec!["list_files", "get_file_content"]);
    }
}
