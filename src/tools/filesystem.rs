//! 沙箱文件系统能力
//!
//! Sandbox 绑定 root_dir，所有路径先做词法检查（拒绝绝对路径与 ..），再校验规范化后仍在 root 下；
//! ReadFileCapability / WriteFileCapability / ListDirectoryCapability 基于 Sandbox 提供 read-file / write-file / list-directory。

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::core::CapabilityError;
use crate::tools::schema::{clean_text_input, input_schema, parse_json_input};
use crate::tools::{Capability, InputShape, InvocationContext};

/// 沙箱文件系统：绑定根目录，防止路径逃逸
#[derive(Debug, Clone)]
pub struct Sandbox {
    root_dir: PathBuf,
}

impl Sandbox {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 词法检查：只允许普通路径段；位于 root 下的绝对路径会被转为相对路径
    fn relative(&self, path: &str) -> Result<PathBuf, CapabilityError> {
        let trimmed = path.trim();
        let candidate = Path::new(trimmed);
        let candidate = if candidate.is_absolute() {
            candidate
                .strip_prefix(&self.root_dir)
                .map_err(|_| CapabilityError::PathEscape(trimmed.to_string()))?
        } else {
            candidate
        };

        let mut rel = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => rel.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(CapabilityError::PathEscape(trimmed.to_string())); // 如 ../../etc/passwd
                }
            }
        }
        Ok(rel)
    }

    /// 解析已存在的路径，规范化后（跟随符号链接）仍须在 root 下
    pub fn resolve(&self, path: &str) -> Result<PathBuf, CapabilityError> {
        let rel = self.relative(path)?;
        let full = self.root_dir.join(&rel);
        let canonical = full
            .canonicalize()
            .map_err(|e| CapabilityError::io(path.trim(), e))?;
        let root_canon = self
            .root_dir
            .canonicalize()
            .unwrap_or_else(|_| self.root_dir.clone());
        if canonical.starts_with(root_canon) {
            Ok(canonical)
        } else {
            Err(CapabilityError::PathEscape(path.trim().to_string()))
        }
    }

    /// 解析写入目标：文件可以不存在，父目录按需创建；先校验已存在的最深祖先仍在 root 下，再建目录
    pub fn resolve_for_write(&self, path: &str) -> Result<PathBuf, CapabilityError> {
        let rel = self.relative(path)?;
        if rel.as_os_str().is_empty() {
            return Err(CapabilityError::invalid_input("write", "path must name a file"));
        }
        let full = self.root_dir.join(&rel);
        let Some(parent) = full.parent() else {
            return Ok(full);
        };
        std::fs::create_dir_all(&self.root_dir).map_err(|e| CapabilityError::io(path.trim(), e))?;
        let root_canon = self
            .root_dir
            .canonicalize()
            .unwrap_or_else(|_| self.root_dir.clone());

        let existing = parent
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or(self.root_dir.as_path());
        let existing_canon = existing
            .canonicalize()
            .map_err(|e| CapabilityError::io(path.trim(), e))?;
        if !existing_canon.starts_with(&root_canon) {
            return Err(CapabilityError::PathEscape(path.trim().to_string()));
        }

        std::fs::create_dir_all(parent).map_err(|e| CapabilityError::io(path.trim(), e))?;
        let parent_canon = parent
            .canonicalize()
            .map_err(|e| CapabilityError::io(path.trim(), e))?;
        if !parent_canon.starts_with(&root_canon) {
            return Err(CapabilityError::PathEscape(path.trim().to_string()));
        }
        Ok(full)
    }

    /// 校验单个文件名（不含目录分隔符与 ..），用于只接受"名字"的能力
    pub fn bare_file_name(name: &str) -> Result<String, CapabilityError> {
        let name = name.trim();
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => Ok(part.to_string_lossy().to_string()),
            _ => Err(CapabilityError::PathEscape(name.to_string())),
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, CapabilityError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved).map_err(|e| CapabilityError::io(path.trim(), e))
    }

    /// 追加写入，返回写入字节数
    pub fn append(&self, path: &str, content: &str) -> Result<usize, CapabilityError> {
        let resolved = self.resolve_for_write(path)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&resolved)
            .map_err(|e| CapabilityError::io(path.trim(), e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| CapabilityError::io(path.trim(), e))?;
        Ok(content.len())
    }

    /// 覆盖写入（仅供由文件名派生路径的能力使用，如 transcript-fetch）
    pub fn write(&self, path: &str, content: &str) -> Result<PathBuf, CapabilityError> {
        let resolved = self.resolve_for_write(path)?;
        std::fs::write(&resolved, content).map_err(|e| CapabilityError::io(path.trim(), e))?;
        Ok(resolved)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, CapabilityError> {
        let rel = self.relative(path)?;
        let base = if rel.as_os_str().is_empty() {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        let read = std::fs::read_dir(&base).map_err(|e| CapabilityError::io(path.trim(), e))?;
        for e in read {
            let e = e.map_err(|e| CapabilityError::io(path.trim(), e))?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{}{}", name, ty));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

/// read-file：读取工作区内文件内容
pub struct ReadFileCapability {
    fs: Sandbox,
}

impl ReadFileCapability {
    pub fn new(fs: Sandbox) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Capability for ReadFileCapability {
    fn name(&self) -> &str {
        "read-file"
    }

    fn description(&self) -> &str {
        "Reads a file in the workspace and returns its content."
    }

    fn input_shape(&self) -> InputShape {
        InputShape::FreeText {
            hint: "a file path relative to the workspace, e.g. urls.txt",
        }
    }

    async fn invoke(&self, raw_input: &str, _ctx: &InvocationContext) -> Result<String, CapabilityError> {
        let path = clean_text_input(raw_input);
        tracing::info!(path = %path, "read-file");
        self.fs.read_file(path)
    }
}

/// write-file 的输入
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileInput {
    /// 相对工作区的文件路径
    pub path: String,
    /// 追加到文件末尾的内容
    pub content: String,
}

/// write-file：向工作区文件追加内容（不存在则创建）
pub struct WriteFileCapability {
    fs: Sandbox,
}

impl WriteFileCapability {
    pub fn new(fs: Sandbox) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Capability for WriteFileCapability {
    fn name(&self) -> &str {
        "write-file"
    }

    fn description(&self) -> &str {
        "Appends content to a file in the workspace, creating it if needed. \
         Never use it to save transcripts; transcript-fetch saves them itself."
    }

    fn input_shape(&self) -> InputShape {
        InputShape::Json(input_schema::<WriteFileInput>())
    }

    async fn invoke(&self, raw_input: &str, _ctx: &InvocationContext) -> Result<String, CapabilityError> {
        let input: WriteFileInput = parse_json_input(self.name(), raw_input)?;
        tracing::info!(path = %input.path, bytes = input.content.len(), "write-file");
        let written = self.fs.append(&input.path, &input.content)?;
        Ok(format!("Content written to {} ({} bytes appended)", input.path.trim(), written))
    }
}

/// list-directory：列出工作区内目录项（目录带 / 后缀）
pub struct ListDirectoryCapability {
    fs: Sandbox,
}

impl ListDirectoryCapability {
    pub fn new(fs: Sandbox) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Capability for ListDirectoryCapability {
    fn name(&self) -> &str {
        "list-directory"
    }

    fn description(&self) -> &str {
        "Returns the names of the entries in a workspace directory."
    }

    fn input_shape(&self) -> InputShape {
        InputShape::FreeText {
            hint: "a directory path relative to the workspace, '.' for the root",
        }
    }

    async fn invoke(&self, raw_input: &str, _ctx: &InvocationContext) -> Result<String, CapabilityError> {
        let path = clean_text_input(raw_input);
        tracing::info!(path = %path, "list-directory");
        let entries = self.fs.list_dir(path)?;
        if entries.is_empty() {
            Ok(format!("{} is empty", if path.is_empty() { "." } else { path }))
        } else {
            Ok(entries.join("\n"))
        }
    }
}
