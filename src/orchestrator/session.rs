//! 工作流会话 - 编排层
//!
//! ## 职责
//!
//! - 持有会话状态与"线程名 → 线程 ID"映射（每个会话独立，互不共享）
//! - 初始化：连接总线并创建两个线程，失败时回到未初始化状态
//! - 评分工作流：按固定顺序发出四条指令，再在一个超时窗口内收集回复
//! - 文档处理工作流：提取文字 → 分段
//!
//! 未初始化时运行工作流直接返回失败结果，不会隐式初始化。

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, ConfigError, OrchestrationError};
use crate::infrastructure::FileStore;
use crate::models::Rubric;
use crate::orchestrator::batch_processor::{ProcessingStats, Submission};
use crate::orchestrator::bus::{AgentId, Instruction, MessageBus, ThreadId};
use crate::orchestrator::synthesis::{
    synthesize_document, synthesize_grading, DocumentOutcome, WorkflowOutcome,
};

/// 评分线程
pub const GRADING_THREAD: &str = "grading-workflow";
/// 文档处理线程
pub const DOCUMENT_THREAD: &str = "document-processing";

const GRADING_PARTICIPANTS: [AgentId; 4] = [
    AgentId::Ocr,
    AgentId::Grading,
    AgentId::Feedback,
    AgentId::Document,
];
const DOCUMENT_PARTICIPANTS: [AgentId; 2] = [AgentId::Ocr, AgentId::Document];

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Connecting,
    Initialized,
    Running,
    Idle,
}

impl SessionState {
    pub fn is_initialized(&self) -> bool {
        matches!(
            self,
            SessionState::Initialized | SessionState::Running | SessionState::Idle
        )
    }
}

/// 会话参数
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub main_agent_id: String,
    pub workflow_timeout: Duration,
    pub document_timeout: Duration,
    pub send_attempts: u32,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            main_agent_id: config.bus_main_agent_id.clone(),
            workflow_timeout: Duration::from_millis(config.workflow_timeout_ms),
            document_timeout: Duration::from_millis(config.document_timeout_ms),
            send_attempts: config.send_attempts,
        }
    }
}

/// `status()` 的返回值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub is_initialized: bool,
    pub is_connected: bool,
    pub threads: Vec<String>,
    pub thread_count: usize,
}

/// 工作流会话
pub struct WorkflowSession<B> {
    bus: B,
    settings: SessionSettings,
    state: SessionState,
    threads: BTreeMap<&'static str, ThreadId>,
}

impl<B: MessageBus> WorkflowSession<B> {
    pub fn new(bus: B, settings: SessionSettings) -> Self {
        Self {
            bus,
            settings,
            state: SessionState::Uninitialized,
            threads: BTreeMap::new(),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 初始化会话
    ///
    /// 已初始化时直接返回成功，不会重复创建线程
    pub async fn initialize(&mut self) -> AppResult<()> {
        if self.state.is_initialized() {
            info!("✓ 会话已初始化，跳过");
            return Ok(());
        }

        self.state = SessionState::Connecting;
        match self.connect_and_create_threads().await {
            Ok(()) => {
                self.state = SessionState::Initialized;
                info!("✓ 会话初始化完成，线程: {:?}", self.threads.keys().collect::<Vec<_>>());
                Ok(())
            }
            Err(e) => {
                error!("❌ 会话初始化失败: {}", e);
                self.state = SessionState::Uninitialized;
                self.threads.clear();
                Err(e)
            }
        }
    }

    async fn connect_and_create_threads(&mut self) -> AppResult<()> {
        if self.settings.main_agent_id.trim().is_empty() {
            return Err(ConfigError::MissingValue {
                name: "BUS_MAIN_AGENT_ID".to_string(),
            }
            .into());
        }

        if !self.bus.connect().await {
            return Err(OrchestrationError::BusUnreachable.into());
        }

        let agents = self.bus.list_agents().await;
        info!("🤝 总线上可用的 agent: {}", agents.len());
        for agent in &agents {
            info!("   - {} ({}): {}", agent.name, agent.status, agent.description);
        }

        for (name, participants) in [
            (GRADING_THREAD, &GRADING_PARTICIPANTS[..]),
            (DOCUMENT_THREAD, &DOCUMENT_PARTICIPANTS[..]),
        ] {
            let id = self
                .bus
                .create_thread(name, participants)
                .await
                .ok_or_else(|| OrchestrationError::ThreadCreationFailed {
                    name: name.to_string(),
                })?;
            self.threads.insert(name, id);
        }
        Ok(())
    }

    /// 评分工作流
    pub async fn run_grading_workflow(
        &mut self,
        key_path: &str,
        student_path: &str,
        rubric: &Rubric,
        student_name: &str,
        exam_title: &str,
    ) -> WorkflowOutcome {
        let thread = match self.thread(GRADING_THREAD) {
            Ok(thread) => thread,
            Err(e) => return WorkflowOutcome::failure(student_name, exam_title, e),
        };

        self.state = SessionState::Running;
        info!("📨 [{}] 开始评分工作流: {}", student_name, exam_title);

        let steps = [
            (AgentId::Document, Instruction::ProcessKey { path: key_path.to_string() }),
            (AgentId::Document, Instruction::ProcessStudent { path: student_path.to_string() }),
            (AgentId::Grading, Instruction::GradeWithRubric { rubric: rubric.clone() }),
            (AgentId::Feedback, Instruction::GenerateFeedback { student_name: student_name.to_string() }),
        ];
        let expected = steps.len();

        for (agent, instruction) in steps {
            if let Err(e) = self.send_with_retry(&thread, &instruction, agent).await {
                self.state = SessionState::Idle;
                return WorkflowOutcome::failure(student_name, exam_title, e);
            }
        }

        let responses = self
            .bus
            .wait_for_mentions(self.settings.workflow_timeout, expected)
            .await;
        if responses.len() < expected {
            warn!("⚠️ [{}] 只收到 {}/{} 条回复", student_name, responses.len(), expected);
        }

        self.state = SessionState::Idle;
        synthesize_grading(responses, student_name, exam_title)
    }

    /// 逐份运行评分工作流并保存报告
    ///
    /// 工作流失败或报告保存失败都只计入失败数，继续处理下一份
    pub async fn grade_submissions(
        &mut self,
        store: &FileStore,
        key_path: &Path,
        submissions: &[Submission],
        rubric: &Rubric,
        exam_title: &str,
    ) -> ProcessingStats {
        let mut stats = ProcessingStats {
            total: submissions.len(),
            ..ProcessingStats::default()
        };
        let key_path = key_path.display().to_string();

        for submission in submissions {
            let outcome = self
                .run_grading_workflow(
                    &key_path,
                    &submission.path.display().to_string(),
                    rubric,
                    &submission.student_name,
                    exam_title,
                )
                .await;

            if !outcome.success {
                warn!(
                    "⚠️ [答卷 {}] 工作流失败: {}",
                    submission.student_name,
                    outcome.error.as_deref().unwrap_or("unknown")
                );
                stats.failed += 1;
                continue;
            }

            info!(
                "[答卷 {}] 收到 {} 条回复，得分 {:.1}/{:.1}",
                submission.student_name,
                outcome.responses_received,
                outcome.awarded_marks,
                outcome.total_marks
            );
            match store.save_report(&outcome.into_report()).await {
                Ok(saved) => {
                    info!("💾 报告已保存: {}", saved.display());
                    stats.success += 1;
                    stats.reports.push(saved);
                }
                Err(e) => {
                    error!("❌ [答卷 {}] 报告保存失败: {:#}", submission.student_name, e);
                    stats.failed += 1;
                }
            }
        }

        stats
    }

    /// 文档处理工作流：提取文字并分段
    pub async fn run_document_processing(&mut self, path: &str, processing_type: &str) -> DocumentOutcome {
        let thread = match self.thread(DOCUMENT_THREAD) {
            Ok(thread) => thread,
            Err(e) => return DocumentOutcome::failure(processing_type, e),
        };

        self.state = SessionState::Running;
        info!("📨 开始文档处理: {} ({})", path, processing_type);

        let steps = [
            (AgentId::Ocr, Instruction::ExtractText { path: path.to_string() }),
            (AgentId::Document, Instruction::StructureText { processing_type: processing_type.to_string() }),
        ];
        let expected = steps.len();

        for (agent, instruction) in steps {
            if let Err(e) = self.send_with_retry(&thread, &instruction, agent).await {
                self.state = SessionState::Idle;
                return DocumentOutcome::failure(processing_type, e);
            }
        }

        let responses = self
            .bus
            .wait_for_mentions(self.settings.document_timeout, expected)
            .await;

        self.state = SessionState::Idle;
        synthesize_document(responses, processing_type)
    }

    pub fn status(&self) -> SessionStatus {
        let threads: Vec<String> = self.threads.keys().map(|name| name.to_string()).collect();
        SessionStatus {
            state: self.state,
            is_initialized: self.state.is_initialized(),
            is_connected: self.bus.is_connected(),
            thread_count: threads.len(),
            threads,
        }
    }

    fn thread(&self, name: &str) -> Result<ThreadId, OrchestrationError> {
        if !self.state.is_initialized() {
            return Err(OrchestrationError::NotInitialized);
        }
        self.threads
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestrationError::ThreadNotFound {
                name: name.to_string(),
            })
    }

    async fn send_with_retry(
        &self,
        thread: &ThreadId,
        instruction: &Instruction,
        mention: AgentId,
    ) -> AppResult<()> {
        let content = instruction.to_content()?;
        let attempts = self.settings.send_attempts.max(1);

        for attempt in 1..=attempts {
            if self.bus.send_message(thread, &content, &[mention]).await {
                return Ok(());
            }
            warn!(
                "⚠️ 发送 {} 给 {} 失败 (第 {}/{} 次)",
                instruction.action(),
                mention,
                attempt,
                attempts
            );
        }

        Err(OrchestrationError::SendFailed {
            thread: thread.to_string(),
            mention: mention.to_string(),
        }
        .into())
    }
}
