//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HARVEST__*` 覆盖（双下划线表示嵌套，如 `HARVEST__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub controller: ControllerSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、沙箱根目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 沙箱根目录，所有能力的文件读写都限制在此目录下
    pub workspace_root: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            workspace_root: PathBuf::from("workspace"),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openrouter / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 单次 Reasoner 调用超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openrouter".to_string(),
            model: "openrouter/optimus-alpha".to_string(),
            base_url: None,
            request_timeout_secs: 120,
        }
    }
}

/// [agent] 段：ReAct 循环预算与委派深度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单次运行最多调用 Reasoner 的次数
    pub max_iterations: usize,
    /// delegate 嵌套层数上限（控制器发起的委派为第 1 层）
    pub max_delegation_depth: usize,
    /// 可选：覆盖内置 ReAct 模板
    pub prompt_file: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_delegation_depth: 2,
            prompt_file: None,
        }
    }
}

/// [controller] 段：重试次数、失败判定、数据集文件名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    /// 每个步骤最多委派次数（含首次）
    pub max_attempts: usize,
    /// Worker 最终回复以这些片段开头（忽略大小写与前导标点）即视为失败；正文中间出现不算
    pub failure_markers: Vec<String>,
    pub dataset_file: String,
    /// 依赖步骤的输出转述给后续步骤时保留的最大字符数
    pub carry_output_chars: usize,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            failure_markers: default_failure_markers(),
            dataset_file: "dataset.csv".to_string(),
            carry_output_chars: 600,
        }
    }
}

fn default_failure_markers() -> Vec<String> {
    [
        "failed",
        "i failed",
        "task failed",
        "unable to",
        "i was unable",
        "i am unable",
        "i'm unable",
        "could not",
        "couldn't",
        "i could not",
        "i couldn't",
        "i cannot",
        "i can't",
        "cannot complete",
        "not completed",
        "did not complete",
        "incomplete",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// [tools] 段：通用超时与各能力参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次能力调用超时（秒），delegate 不受此限制
    pub tool_timeout_secs: u64,
    pub search: SearchSection,
    pub transcript: TranscriptSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 60,
            search: SearchSection::default(),
            transcript: TranscriptSection::default(),
        }
    }
}

/// [tools.search] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub timeout_secs: u64,
    pub max_results: usize,
    pub max_result_chars: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_results: 8,
            max_result_chars: 6000,
        }
    }
}

/// [tools.transcript] 段：字幕保存目录（相对沙箱根）、超时、首选语言
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptSection {
    pub directory: String,
    pub timeout_secs: u64,
    pub preferred_language: String,
}

impl Default for TranscriptSection {
    fn default() -> Self {
        Self {
            directory: "transcripts".to_string(),
            timeout_secs: 30,
            preferred_language: "en".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HARVEST__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HARVEST__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HARVEST")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_iterations, 15);
        assert_eq!(cfg.controller.max_attempts, 3);
        assert_eq!(cfg.tools.transcript.directory, "transcripts");
        assert!(cfg
            .controller
            .failure_markers
            .iter()
            .any(|m| m == "unable to"));
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_iterations = 4\n\n[controller]\nmax_attempts = 5\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.max_iterations, 4);
        assert_eq!(cfg.controller.max_attempts, 5);
        // 未出现的键保留默认值
        assert_eq!(cfg.controller.dataset_file, "dataset.csv");
    }
}
