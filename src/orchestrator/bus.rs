//! 消息总线协议
//!
//! agent 通过具名线程通信：编排器向线程发送带 mention 的指令，
//! agent 的回复是独立的消息，只能通过发送者身份与指令对应。

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use crate::models::Rubric;

/// 参与者身份
///
/// 线上名称互不包含，按完整名称（忽略大小写）路由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentId {
    #[serde(rename = "ocr-agent")]
    Ocr,
    #[serde(rename = "grading-agent")]
    Grading,
    #[serde(rename = "feedback-agent")]
    Feedback,
    #[serde(rename = "document-agent")]
    Document,
}

impl AgentId {
    pub const ALL: [AgentId; 4] = [
        AgentId::Ocr,
        AgentId::Grading,
        AgentId::Feedback,
        AgentId::Document,
    ];

    pub fn wire_name(&self) -> &'static str {
        match self {
            AgentId::Ocr => "ocr-agent",
            AgentId::Grading => "grading-agent",
            AgentId::Feedback => "feedback-agent",
            AgentId::Document => "document-agent",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AgentId::Ocr => "Extracts text from scanned documents",
            AgentId::Grading => "Scores student answers against a rubric",
            AgentId::Feedback => "Writes overall feedback for a graded submission",
            AgentId::Document => "Splits extracted text into question/answer pairs",
        }
    }

    /// 按完整名称解析（忽略大小写与首尾空白）
    pub fn from_wire(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.wire_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for AgentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s).ok_or_else(|| format!("未知的 agent: {}", s))
    }
}

/// 总线分配的线程 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 等待期间收到的 agent 回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

impl AgentResponse {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp: Local::now(),
        }
    }

    /// 发送者对应的 agent；名称不完全匹配时为 `None`
    pub fn sender_agent(&self) -> Option<AgentId> {
        AgentId::from_wire(&self.sender)
    }
}

/// `list_agents` 返回的 agent 信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    pub status: String,
}

/// 编排器发给 agent 的指令，JSON 序列化后作为消息正文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Instruction {
    /// 处理标准答案文档
    ProcessKey { path: String },
    /// 处理学生答卷文档
    ProcessStudent { path: String },
    /// 按评分标准评分
    GradeWithRubric { rubric: Rubric },
    /// 生成总体反馈
    GenerateFeedback { student_name: String },
    /// 提取文档文字
    ExtractText { path: String },
    /// 对已提取的文字分段
    StructureText { processing_type: String },
}

impl Instruction {
    pub fn to_content(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_content(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Instruction::ProcessKey { .. } => "process_key",
            Instruction::ProcessStudent { .. } => "process_student",
            Instruction::GradeWithRubric { .. } => "grade_with_rubric",
            Instruction::GenerateFeedback { .. } => "generate_feedback",
            Instruction::ExtractText { .. } => "extract_text",
            Instruction::StructureText { .. } => "structure_text",
        }
    }

    /// 每次工作流发出的第一条指令，收到时清空上一次的中间结果
    pub fn starts_run(&self) -> bool {
        matches!(
            self,
            Instruction::ProcessKey { .. } | Instruction::ExtractText { .. }
        )
    }
}

/// 消息总线
///
/// 所有调用都可能失败；`false` / `None` 表示"可以重试"，是否重试由编排器决定
pub trait MessageBus: Send + Sync {
    /// 建立连接，不可达时返回 `false`
    fn connect(&self) -> impl Future<Output = bool> + Send;

    fn is_connected(&self) -> bool;

    fn create_thread(
        &self,
        name: &str,
        participants: &[AgentId],
    ) -> impl Future<Output = Option<ThreadId>> + Send;

    fn send_message(
        &self,
        thread: &ThreadId,
        content: &str,
        mentions: &[AgentId],
    ) -> impl Future<Output = bool> + Send;

    /// 最多等待 `timeout`，收集至多 `max_count` 条回复；超时不是错误
    fn wait_for_mentions(
        &self,
        timeout: Duration,
        max_count: usize,
    ) -> impl Future<Output = Vec<AgentResponse>> + Send;

    fn list_agents(&self) -> impl Future<Output = Vec<AgentInfo>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_routing_is_exact() {
        assert_eq!(AgentId::from_wire("Grading-Agent"), Some(AgentId::Grading));
        assert_eq!(AgentId::from_wire(" ocr-agent "), Some(AgentId::Ocr));
        // 子串不再被当作匹配
        assert_eq!(AgentId::from_wire("my-document-agent-2"), None);
        assert!("feedback".parse::<AgentId>().is_err());
    }

    #[test]
    fn test_instruction_wire_format() {
        let content = Instruction::ProcessKey {
            path: "/tmp/key.pdf".to_string(),
        }
        .to_content()
        .unwrap();
        assert_eq!(content, r#"{"action":"process_key","path":"/tmp/key.pdf"}"#);

        let parsed = Instruction::from_content(r#"{"action":"structure_text","processing_type":"qa_extraction"}"#)
            .unwrap();
        assert_eq!(parsed.action(), "structure_text");
        assert!(!parsed.starts_run());
        assert!(Instruction::ExtractText { path: "a.pdf".to_string() }.starts_run());
    }

    #[test]
    fn test_agent_id_serde_uses_wire_name() {
        let json = serde_json::to_string(&AgentId::Feedback).unwrap();
        assert_eq!(json, "\"feedback-agent\"");
    }
}
