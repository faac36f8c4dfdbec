//! 进程内 agent 名册
//!
//! 每个 agent 只是 `GradingFlow` 某项能力的一层包装，按 `AgentId` 显式分派。
//! agent 之间通过同一块 `Blackboard` 传递中间结果。

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::infrastructure::{LanguageModel, VisionModel};
use crate::models::{Document, GradingResult, QaPair, ReportTotals, Rubric};
use crate::orchestrator::bus::{AgentId, Instruction};
use crate::workflow::GradingFlow;

/// agent 共享的中间结果
#[derive(Debug, Default, Clone)]
pub struct Blackboard {
    pub extracted_text: Option<String>,
    pub key_pairs: Vec<QaPair>,
    pub student_pairs: Vec<QaPair>,
    pub results: Vec<GradingResult>,
}

/// 文档角色
#[derive(Debug, Clone, Copy)]
enum DocumentRole {
    Key,
    Student,
}

impl DocumentRole {
    fn as_str(&self) -> &'static str {
        match self {
            DocumentRole::Key => "key",
            DocumentRole::Student => "student",
        }
    }
}

/// agent 名册：`AgentId` → 能力
pub struct AgentRoster<M> {
    flow: Arc<GradingFlow<M>>,
    board: Mutex<Blackboard>,
}

impl<M: LanguageModel + VisionModel> AgentRoster<M> {
    pub fn new(flow: Arc<GradingFlow<M>>) -> Self {
        Self {
            flow,
            board: Mutex::new(Blackboard::default()),
        }
    }

    /// 当前黑板内容的快照
    pub async fn snapshot(&self) -> Blackboard {
        self.board.lock().await.clone()
    }

    /// 清空黑板
    pub async fn reset(&self) {
        *self.board.lock().await = Blackboard::default();
    }

    /// 把一条指令交给指定 agent，返回回复正文
    ///
    /// agent 不认识的指令返回错误，调用方据此不产生回复
    pub async fn dispatch(&self, agent: AgentId, instruction: Instruction) -> Result<String> {
        debug!("[{}] 收到指令: {}", agent, instruction.action());
        if instruction.starts_run() {
            self.reset().await;
        }
        match (agent, instruction) {
            (AgentId::Document, Instruction::ProcessKey { path }) => {
                self.process_document(DocumentRole::Key, &path).await
            }
            (AgentId::Document, Instruction::ProcessStudent { path }) => {
                self.process_document(DocumentRole::Student, &path).await
            }
            (AgentId::Document, Instruction::StructureText { processing_type }) => {
                self.structure_text(&processing_type).await
            }
            (AgentId::Grading, Instruction::GradeWithRubric { rubric }) => self.grade(&rubric).await,
            (AgentId::Feedback, Instruction::GenerateFeedback { student_name }) => {
                self.write_feedback(&student_name).await
            }
            (AgentId::Ocr, Instruction::ExtractText { path }) => self.extract_text(&path).await,
            (agent, instruction) => bail!("{} 不处理指令 {}", agent, instruction.action()),
        }
    }

    async fn process_document(&self, role: DocumentRole, path: &str) -> Result<String> {
        // 读取失败时该角色的问答对保持为空
        {
            let mut board = self.board.lock().await;
            match role {
                DocumentRole::Key => board.key_pairs.clear(),
                DocumentRole::Student => board.student_pairs.clear(),
            }
        }

        let document = Document::from_path(Path::new(path)).await?;
        let processed = self.flow.process_document(&document).await;

        let reply = json!({
            "role": role.as_str(),
            "source": processed.extracted.source,
            "qa_pairs": processed.pairs,
        });

        let mut board = self.board.lock().await;
        match role {
            DocumentRole::Key => board.key_pairs = processed.pairs,
            DocumentRole::Student => board.student_pairs = processed.pairs,
        }
        board.extracted_text = Some(processed.extracted.text);
        Ok(reply.to_string())
    }

    async fn structure_text(&self, processing_type: &str) -> Result<String> {
        let text = self
            .board
            .lock()
            .await
            .extracted_text
            .clone()
            .context("没有可分段的文字，需先执行 extract_text")?;

        let pairs = self.flow.segmenter().segment(&text).await;
        info!("[{}] 分段完成: {} 个问答对", AgentId::Document, pairs.len());

        let reply = json!({
            "processing_type": processing_type,
            "qa_pairs": pairs,
        });
        Ok(reply.to_string())
    }

    async fn grade(&self, rubric: &Rubric) -> Result<String> {
        let (key_pairs, student_pairs) = {
            let board = self.board.lock().await;
            (board.key_pairs.clone(), board.student_pairs.clone())
        };

        let results = self
            .flow
            .grader()
            .grade_with_rubric(rubric, &key_pairs, &student_pairs)
            .await;
        let totals = ReportTotals::from_results(&results);
        let reply = json!({
            "results": results,
            "total_marks": totals.total_marks,
            "awarded_marks": totals.awarded_marks,
            "percentage": totals.percentage,
        });

        self.board.lock().await.results = results;
        Ok(reply.to_string())
    }

    async fn write_feedback(&self, student_name: &str) -> Result<String> {
        let results = self.board.lock().await.results.clone();
        debug!("[{}] 为 {} 生成反馈", AgentId::Feedback, student_name);
        Ok(self.flow.feedback().write(&results).await)
    }

    async fn extract_text(&self, path: &str) -> Result<String> {
        self.board.lock().await.extracted_text = None;
        let document = Document::from_path(Path::new(path)).await?;
        let extracted = self.flow.extractor().extract(&document).await;
        self.board.lock().await.extracted_text = Some(extracted.text.clone());
        Ok(extracted.text)
    }
}
