//! 游戏状态仓库
//!
//! 进程里唯一的共享可变游戏状态。所有读写都经过同一把锁；
//! 锁内只做数据操作，不做任何网络 IO——要发出的消息由调用方
//! 在释放锁之后投递，慢客户端不会拖住其他人的回合。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use protocol::{GameSnapshot, PlayerId, ProtocolError, RuleViolation, MAX_USERNAME_LEN};

use crate::config::GameConfig;
use crate::rules::{self, Action, Event};

/// 状态仓库（可克隆句柄）
#[derive(Clone)]
pub struct GameStore {
    state: Arc<Mutex<GameSnapshot>>,
    /// 玩家 ID 生成器：单调递增，进程生命周期内不复用
    next_id: Arc<AtomicU64>,
    config: GameConfig,
}

impl GameStore {
    pub fn new(config: GameConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(GameSnapshot::new(config.cup_count))),
            next_id: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    /// 规则配置
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, GameSnapshot> {
        // 锁中毒只可能来自持锁代码 panic，此时内部状态仍然可用
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 校验用户名
    pub fn validate_username(username: &str) -> Result<(), ProtocolError> {
        if username.trim().is_empty() {
            return Err(ProtocolError::UsernameEmpty);
        }
        let len = username.chars().count();
        if len > MAX_USERNAME_LEN {
            return Err(ProtocolError::UsernameTooLong {
                len,
                max: MAX_USERNAME_LEN,
            });
        }
        Ok(())
    }

    /// 加入会话：分配新玩家 ID 并按策略分配角色
    pub fn join(
        &self,
        username: &str,
        addr: Option<String>,
    ) -> Result<(PlayerId, Vec<Event>), ProtocolError> {
        Self::validate_username(username)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        let events = rules::join(&mut state, &self.config, id, username.trim().to_string(), addr);
        Ok((id, events))
    }

    /// 应用一个回合动作；拒绝时状态保持不变
    pub fn apply(&self, id: PlayerId, action: Action) -> Result<Vec<Event>, RuleViolation> {
        let mut state = self.lock();
        rules::apply(&mut state, &self.config, id, action)
    }

    /// 移除玩家并修复回合指针；幂等
    pub fn leave(&self, id: PlayerId) -> Vec<Event> {
        let mut state = self.lock();
        rules::leave(&mut state, &self.config, id)
    }

    /// 一局结束后的重置
    pub fn reset_round(&self) -> Vec<Event> {
        let mut state = self.lock();
        rules::reset_round(&mut state, &self.config)
    }

    /// 完整快照（未脱敏；测试与日志用）
    pub fn snapshot(&self) -> GameSnapshot {
        self.lock().clone()
    }

    /// 玩家用户名
    pub fn username_of(&self, id: PlayerId) -> Option<String> {
        self.lock().player(id).map(|p| p.username.clone())
    }

    /// 为每个在场玩家生成各自的脱敏快照
    ///
    /// 在锁内一次性克隆完成，调用方在锁外发送
    pub fn snapshots_per_player(&self) -> Vec<(PlayerId, GameSnapshot)> {
        let state = self.lock();
        state
            .players
            .iter()
            .map(|p| (p.id, state.redacted_for(p.id)))
            .collect()
    }
}
