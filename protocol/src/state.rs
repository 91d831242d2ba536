//! 游戏状态快照定义
//!
//! 快照总是整体广播，不发送增量：收到任意一帧快照的客户端
//! 即拥有完整一致的视图，客户端不需要任何合并逻辑

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{PlayerId, Position};

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// 等待玩家加入
    #[default]
    Waiting,
    /// 轮流行动中
    Active,
    /// 有人达到胜利条件
    Finished,
}

impl Phase {
    /// 阶段名称（用于拒绝信息）
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::Active => "active",
            Phase::Finished => "finished",
        }
    }
}

/// 玩家角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// 藏家
    Hider,
    /// 猜家
    Guesser,
    /// 无角色
    #[default]
    None,
}

/// 玩家信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub username: String,
    /// 远端地址（服务端填写，仅供展示与日志）
    pub addr: Option<String>,
    pub role: Role,
    pub score: u32,
}

/// 动作类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Hide,
    Guess,
    Move,
}

/// 已记录的动作（日志只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub player_id: PlayerId,
    pub action: ActionKind,
    pub position: Position,
    pub at: DateTime<Utc>,
}

/// 游戏状态快照
///
/// 服务端进程中只存在一份权威状态；客户端只观察快照，从不直接修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub phase: Phase,
    /// 加入顺序即回合顺序
    pub players: Vec<PlayerInfo>,
    /// 当前有权行动的玩家；Waiting/Finished 阶段为空
    pub turn: Option<PlayerId>,
    /// 藏家的秘密位置；对非藏家视图脱敏
    pub secret: Option<Position>,
    /// 杯子数量（有效位置 1..=cup_count）
    pub cup_count: u8,
    /// 动作日志
    pub moves: Vec<MoveRecord>,
    /// 胜者（仅 Finished 阶段）
    pub winner: Option<PlayerId>,
}

impl GameSnapshot {
    /// 创建空会话状态
    pub fn new(cup_count: u8) -> Self {
        Self {
            phase: Phase::Waiting,
            players: Vec::new(),
            turn: None,
            secret: None,
            cup_count,
            moves: Vec::new(),
            winner: None,
        }
    }

    /// 查找玩家
    pub fn player(&self, id: PlayerId) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.id == id)
    }

    /// 查找玩家（可变）
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerInfo> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// 玩家角色；不存在时为 None 角色
    pub fn role_of(&self, id: PlayerId) -> Role {
        self.player(id).map(|p| p.role).unwrap_or_default()
    }

    /// 持有指定角色的玩家
    pub fn player_with_role(&self, role: Role) -> Option<PlayerId> {
        self.players.iter().find(|p| p.role == role).map(|p| p.id)
    }

    /// 是否轮到该玩家
    pub fn is_turn(&self, id: PlayerId) -> bool {
        self.turn == Some(id)
    }

    /// 为指定观察者生成脱敏视图
    ///
    /// 秘密位置只保留在藏家自己的视图里，
    /// 猜家（以及其他任何人）的快照中一律清除
    pub fn redacted_for(&self, viewer: PlayerId) -> GameSnapshot {
        let mut snapshot = self.clone();
        if snapshot.role_of(viewer) != Role::Hider {
            snapshot.secret = None;
        }
        snapshot
    }
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_CUP_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_state() -> GameSnapshot {
        let mut state = GameSnapshot::new(3);
        state.players.push(PlayerInfo {
            id: 1,
            username: "alice".to_string(),
            addr: None,
            role: Role::Hider,
            score: 0,
        });
        state.players.push(PlayerInfo {
            id: 2,
            username: "bob".to_string(),
            addr: None,
            role: Role::Guesser,
            score: 0,
        });
        state.phase = Phase::Active;
        state.turn = Some(1);
        state.secret = Some(2);
        state
    }

    #[test]
    fn test_redaction_for_guesser() {
        let state = two_player_state();

        // 藏家可以看到秘密
        assert_eq!(state.redacted_for(1).secret, Some(2));

        // 猜家的视图里秘密被清除
        assert_eq!(state.redacted_for(2).secret, None);

        // 未知观察者同样看不到
        assert_eq!(state.redacted_for(99).secret, None);
    }

    #[test]
    fn test_role_queries() {
        let state = two_player_state();
        assert_eq!(state.role_of(1), Role::Hider);
        assert_eq!(state.role_of(2), Role::Guesser);
        assert_eq!(state.role_of(99), Role::None);
        assert_eq!(state.player_with_role(Role::Guesser), Some(2));
        assert!(state.is_turn(1));
        assert!(!state.is_turn(2));
    }
}
