//! 构建器：由 AppConfig 组装 Reasoner、能力集（含 delegate）、委派桥与控制器
//!
//! Worker 与 Manager 共用同一套能力；能力集通过 Arc::new_cyclic 构建，delegate 只持有 Weak。

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use crate::config::AppConfig;
use crate::core::controller::Controller;
use crate::core::ledger::ArtifactLedger;
use crate::core::state::OrchestrationReport;
use crate::core::{AgentError, PlanError};
use crate::llm::{create_reasoner_from_config, Reasoner};
use crate::react::events::{send_event, AgentEvent, EventSender};
use crate::react::{Plan, Planner, ReactTemplate};
use crate::tools::{
    CapabilityExecutor, CapabilityRegistry, DelegateCapability, DelegationBridge, ListDirectoryCapability,
    ReadFileCapability, Sandbox, TranscriptFetchCapability, TranscriptProvider, VideoSearchCapability,
    WebSearchCapability, WriteFileCapability, YoutubeTranscripts,
};

pub struct HarvestBuilder {
    config: AppConfig,
    workspace: PathBuf,
    reasoner: Option<Arc<dyn Reasoner>>,
    transcripts: Option<Arc<dyn TranscriptProvider>>,
    events: Option<EventSender>,
}

impl HarvestBuilder {
    pub fn new(config: AppConfig) -> Self {
        let workspace = config.app.workspace_root.clone();
        Self {
            config,
            workspace,
            reasoner: None,
            transcripts: None,
            events: None,
        }
    }

    /// 覆盖配置中的工作区根目录
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// 注入 Reasoner（测试或自定义后端）；不设置时按 [llm] 配置创建
    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn with_transcript_provider(mut self, provider: Arc<dyn TranscriptProvider>) -> Self {
        self.transcripts = Some(provider);
        self
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    /// 除 delegate 外的全部能力
    fn build_registry(&self, sandbox: &Sandbox) -> CapabilityRegistry {
        let tools = &self.config.tools;
        let transcripts = self
            .transcripts
            .clone()
            .unwrap_or_else(|| Arc::new(YoutubeTranscripts::new(&tools.transcript)));

        let mut registry = CapabilityRegistry::new();
        registry.register(WebSearchCapability::new(&tools.search));
        registry.register(VideoSearchCapability::new(&tools.search));
        registry.register(TranscriptFetchCapability::new(
            transcripts,
            sandbox.clone(),
            tools.transcript.directory.clone(),
        ));
        registry.register(ReadFileCapability::new(sandbox.clone()));
        registry.register(WriteFileCapability::new(sandbox.clone()));
        registry.register(ListDirectoryCapability::new(sandbox.clone()));
        registry
    }

    pub fn build(self) -> Result<Harvester, AgentError> {
        std::fs::create_dir_all(&self.workspace).map_err(|e| {
            AgentError::Config(format!("cannot create workspace {}: {}", self.workspace.display(), e))
        })?;
        let sandbox = Sandbox::new(&self.workspace);
        let template = Arc::new(ReactTemplate::load(self.config.agent.prompt_file.as_deref())?);
        let reasoner = self
            .reasoner
            .clone()
            .unwrap_or_else(|| create_reasoner_from_config(&self.config));

        let agent_cfg = &self.config.agent;
        let make_bridge = |weak: Weak<CapabilityExecutor>| {
            DelegationBridge::new(
                reasoner.clone(),
                weak,
                template.clone(),
                agent_cfg.max_iterations,
                agent_cfg.max_delegation_depth,
            )
            .with_events(self.events.clone())
        };

        let mut registry = self.build_registry(&sandbox);
        let executor = Arc::new_cyclic(|weak: &Weak<CapabilityExecutor>| {
            registry.register(DelegateCapability::new(make_bridge(weak.clone())));
            CapabilityExecutor::new(registry, self.config.tools.tool_timeout_secs)
        });
        let bridge = make_bridge(Arc::downgrade(&executor));

        tracing::info!(
            workspace = %sandbox.root().display(),
            capabilities = %executor.names().join(", "),
            "harvester ready"
        );

        Ok(Harvester {
            planner: Planner::new(reasoner.clone()),
            ledger: ArtifactLedger::new(
                sandbox.root(),
                &self.config.tools.transcript.directory,
                &self.config.controller.dataset_file,
            ),
            reasoner,
            executor,
            bridge,
            sandbox,
            events: self.events,
            config: self.config,
        })
    }
}

/// 预构建的组件：Planner、共享能力集、委派桥与控制器配置；持有能力集的唯一强引用
pub struct Harvester {
    config: AppConfig,
    reasoner: Arc<dyn Reasoner>,
    planner: Planner,
    executor: Arc<CapabilityExecutor>,
    bridge: DelegationBridge,
    sandbox: Sandbox,
    ledger: ArtifactLedger,
    events: Option<EventSender>,
}

impl Harvester {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn reasoner(&self) -> &Arc<dyn Reasoner> {
        &self.reasoner
    }

    pub fn executor(&self) -> &Arc<CapabilityExecutor> {
        &self.executor
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub async fn plan(&self, goal: &str) -> Result<Plan, PlanError> {
        let plan = self.planner.plan(goal).await?;
        send_event(
            &self.events,
            AgentEvent::PlanReady {
                goal: goal.to_string(),
                steps: plan.steps().iter().map(|s| s.instruction.clone()).collect(),
            },
        );
        Ok(plan)
    }

    /// 按计划编排；总是返回报告
    pub async fn execute(&self, plan: &Plan) -> OrchestrationReport {
        let controller = Controller::new(
            Arc::new(self.bridge.clone()),
            &self.config.controller,
            self.ledger.clone(),
        )
        .with_events(self.events.clone());
        controller.walk(plan).await
    }

    /// 规划并执行；只有规划失败会返回错误
    pub async fn run(&self, goal: &str) -> Result<OrchestrationReport, AgentError> {
        let plan = self.plan(goal).await?;
        Ok(self.execute(&plan).await)
    }
}

/// 便捷函数：加载配置并创建构建器，配置加载失败时回退到默认值
pub fn create_builder(config_path: Option<PathBuf>) -> HarvestBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    HarvestBuilder::new(config)
}
