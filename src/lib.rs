//! Harvest - 规划 + 委派的数据采集智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、恢复策略、产物台账、编排控制器、构建器
//! - **llm**: Reasoner 抽象与实现（OpenAI 兼容 / Mock / 脚本化）
//! - **observability**: tracing 初始化
//! - **react**: ReAct 解析与主循环、Planner、过程事件
//! - **tools**: 能力（search、video-search、transcript-fetch、文件读写、delegate）与执行器

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::{
    AgentError, HarvestBuilder, Harvester, OrchestrationOutcome, OrchestrationReport, PlanError, StepStatus,
};
