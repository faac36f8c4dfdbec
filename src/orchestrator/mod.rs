//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和 agent 工作流调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量答卷处理器
//! - 标准答案只处理一次，在所有答卷间共享
//! - 控制并发数量（Semaphore），分批处理
//! - 通过 FileStore 保存报告，输出全局统计信息
//!
//! ### `bus` - 消息总线协议
//! - `AgentId`：参与者身份，按完整名称路由
//! - `Instruction`：编排器发给 agent 的指令（JSON 正文）
//! - `MessageBus`：线程 / 消息 / 等待回复
//!
//! ### `local_bus` + `agents` - 进程内总线
//! - `AgentRoster` 按 `AgentId` 把指令分派给 `GradingFlow` 的各项能力
//! - 单个 agent 超时或失败只是少一条回复
//!
//! ### `session` - 工作流会话
//! - 状态机：未初始化 → 连接中 → 已初始化 → 运行中 → 空闲
//! - 持有线程映射，每个会话独立
//!
//! ### `synthesis` - 回复汇总
//! - 容忍缺失、重复、乱序的回复
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Submission>)     session (agent 工作流)
//!     ↓                                        ↓
//!     ↓                                      MessageBus → AgentRoster
//!     ↓                                        ↓
//! workflow::GradingFlow (处理一份答卷) ←───────┘
//!     ↓
//! services (能力层：normalize / extract / segment / grade / feedback)
//!     ↓
//! infrastructure (基础设施：模型客户端、光栅化、文件存储)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，session 管 agent 协作
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和汇总，不做具体评分判断

pub mod agents;
pub mod batch_processor;
pub mod bus;
pub mod local_bus;
pub mod session;
pub mod synthesis;

// 重新导出主要类型
pub use agents::{AgentRoster, Blackboard};
pub use batch_processor::{App, ProcessingStats, Submission};
pub use bus::{AgentId, AgentInfo, AgentResponse, Instruction, MessageBus, ThreadId};
pub use local_bus::{LocalBus, PostedMessage};
pub use session::{
    SessionSettings, SessionState, SessionStatus, WorkflowSession, DOCUMENT_THREAD,
    GRADING_THREAD,
};
pub use synthesis::{synthesize_document, synthesize_grading, DocumentOutcome, WorkflowOutcome};
