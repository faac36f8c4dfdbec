//! 进程内消息总线
//!
//! `send_message` 会按 mention 顺序依次把指令交给 `AgentRoster`，
//! agent 的回复进入收件箱，由 `wait_for_mentions` 取走。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::Notify;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::infrastructure::{LanguageModel, VisionModel};
use crate::orchestrator::agents::{AgentRoster, Blackboard};
use crate::orchestrator::bus::{AgentId, AgentInfo, AgentResponse, Instruction, MessageBus, ThreadId};
use crate::workflow::GradingFlow;

/// 线程上发送过的一条消息
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub sender: String,
    pub content: String,
    pub mentions: Vec<AgentId>,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug)]
struct ThreadState {
    name: String,
    participants: Vec<AgentId>,
    messages: Vec<PostedMessage>,
}

/// 进程内消息总线
pub struct LocalBus<M> {
    sender_id: String,
    roster: AgentRoster<M>,
    agent_timeout: Duration,
    connected: AtomicBool,
    threads: Mutex<HashMap<ThreadId, ThreadState>>,
    inbox: Mutex<VecDeque<AgentResponse>>,
    arrivals: Notify,
    in_flight: AtomicUsize,
}

impl<M: LanguageModel + VisionModel> LocalBus<M> {
    pub fn new(flow: Arc<GradingFlow<M>>, config: &Config) -> Self {
        Self {
            sender_id: config.bus_main_agent_id.clone(),
            roster: AgentRoster::new(flow),
            agent_timeout: Duration::from_millis(config.agent_timeout_ms),
            connected: AtomicBool::new(false),
            threads: Mutex::new(HashMap::new()),
            inbox: Mutex::new(VecDeque::new()),
            arrivals: Notify::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// 线程上的消息记录（按发送顺序）
    pub fn messages(&self, thread: &ThreadId) -> Vec<PostedMessage> {
        self.lock_threads()
            .get(thread)
            .map(|t| t.messages.clone())
            .unwrap_or_default()
    }

    /// 已创建的线程名称
    pub fn thread_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_threads().values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    pub async fn blackboard(&self) -> Blackboard {
        self.roster.snapshot().await
    }

    fn lock_threads(&self) -> std::sync::MutexGuard<'_, HashMap<ThreadId, ThreadState>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post(&self, response: AgentResponse) {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    fn drain(&self, max_count: usize, collected: &mut Vec<AgentResponse>) {
        let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        while collected.len() < max_count {
            match inbox.pop_front() {
                Some(response) => collected.push(response),
                None => break,
            }
        }
    }

    /// 在超时内执行一条指令；失败只记日志
    async fn deliver(&self, agent: AgentId, instruction: Instruction) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let action = instruction.action();

        match timeout(self.agent_timeout, self.roster.dispatch(agent, instruction)).await {
            Ok(Ok(content)) => {
                debug!("[{}] ✓ {} 完成", agent, action);
                self.post(AgentResponse::new(agent.wire_name(), content));
            }
            Ok(Err(e)) => warn!("[{}] ⚠️ {} 失败: {:#}", agent, action, e),
            Err(_) => warn!(
                "[{}] ⏱️ {} 超时 ({} ms)",
                agent,
                action,
                self.agent_timeout.as_millis()
            ),
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.arrivals.notify_waiters();
    }
}

impl<M: LanguageModel + VisionModel> MessageBus for LocalBus<M> {
    async fn connect(&self) -> bool {
        self.connected.store(true, Ordering::SeqCst);
        info!("🔌 已连接进程内消息总线 (身份: {})", self.sender_id);
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn create_thread(&self, name: &str, participants: &[AgentId]) -> Option<ThreadId> {
        if !self.is_connected() {
            warn!("⚠️ 总线未连接，无法创建线程 {}", name);
            return None;
        }

        let id = ThreadId(format!("thread-{}", Uuid::new_v4()));
        self.lock_threads().insert(
            id.clone(),
            ThreadState {
                name: name.to_string(),
                participants: participants.to_vec(),
                messages: Vec::new(),
            },
        );
        debug!("🧵 创建线程 {} ({})", name, id);
        Some(id)
    }

    async fn send_message(&self, thread: &ThreadId, content: &str, mentions: &[AgentId]) -> bool {
        if !self.is_connected() || mentions.is_empty() {
            return false;
        }

        {
            let mut threads = self.lock_threads();
            let Some(state) = threads.get_mut(thread) else {
                warn!("⚠️ 线程不存在: {}", thread);
                return false;
            };
            if let Some(outsider) = mentions.iter().find(|m| !state.participants.contains(*m)) {
                warn!("⚠️ {} 不是线程 {} 的参与者", outsider, state.name);
                return false;
            }
            state.messages.push(PostedMessage {
                sender: self.sender_id.clone(),
                content: content.to_string(),
                mentions: mentions.to_vec(),
                timestamp: Local::now(),
            });
        }

        let instruction = match Instruction::from_content(content) {
            Ok(instruction) => instruction,
            Err(e) => {
                // 消息已投递，只是没有 agent 能理解
                warn!("⚠️ 无法解析指令: {}", e);
                return true;
            }
        };

        for agent in mentions {
            self.deliver(*agent, instruction.clone()).await;
        }
        true
    }

    async fn wait_for_mentions(&self, window: Duration, max_count: usize) -> Vec<AgentResponse> {
        let deadline = Instant::now() + window;
        let mut collected = Vec::new();

        loop {
            let notified = self.arrivals.notified();
            self.drain(max_count, &mut collected);

            if collected.len() >= max_count || self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            if timeout_at(deadline, notified).await.is_err() {
                self.drain(max_count, &mut collected);
                break;
            }
        }

        collected
    }

    async fn list_agents(&self) -> Vec<AgentInfo> {
        AgentId::ALL
            .iter()
            .map(|id| AgentInfo {
                name: id.wire_name().to_string(),
                description: id.description().to_string(),
                status: "available".to_string(),
            })
            .collect()
    }
}
