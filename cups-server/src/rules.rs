//! 回合规则引擎
//!
//! 纯状态机：输入 (当前状态, 配置, 玩家, 动作)，输出事件列表或拒绝原因。
//! 不做任何 IO，不感知连接；所有拒绝路径都在任何改动之前返回，
//! 因此拒绝时状态一定保持不变。
//!
//! 回合没有时限：卡住的玩家只能靠退出或断线让出回合。
//! 如需每回合计时，在这里扩展。

use chrono::Utc;

use protocol::{
    ActionKind, GameSnapshot, MoveRecord, Phase, PlayerId, PlayerInfo, Position, Role,
    RuleViolation,
};

use crate::config::GameConfig;

/// 经过解码的回合动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hide(Position),
    Guess(Position),
    Move(Position),
}

/// 规则引擎产生的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// 玩家加入
    Joined { id: PlayerId, username: String },
    /// 达到最少人数，游戏开始
    Started { first_turn: PlayerId },
    /// 秘密已藏好
    Hidden { by: PlayerId },
    /// 猜中
    CorrectGuess { by: PlayerId, position: Position },
    /// 未猜中
    IncorrectGuess { by: PlayerId, position: Position },
    /// 通用动作已记录
    Moved { by: PlayerId, position: Position },
    /// 藏家与猜家交换
    RolesSwapped,
    /// 有人达到胜利分数
    Winner { id: PlayerId },
    /// 玩家离开
    Left { id: PlayerId, username: String },
    /// 人数不足，回到等待阶段
    BackToWaiting,
    /// 一局结束后的新开局
    NewRound { first_turn: PlayerId },
}

/// 加入会话：追加玩家并按策略分配角色
///
/// 阶段从 Waiting 切到 Active 恰好发生在人数到达下限的那一次加入
pub fn join(
    state: &mut GameSnapshot,
    config: &GameConfig,
    id: PlayerId,
    username: String,
    addr: Option<String>,
) -> Vec<Event> {
    let role = next_free_role(state);
    state.players.push(PlayerInfo {
        id,
        username: username.clone(),
        addr,
        role,
        score: 0,
    });

    let mut events = vec![Event::Joined { id, username }];

    if state.phase == Phase::Waiting && state.players.len() >= config.min_players {
        state.phase = Phase::Active;
        let first = state
            .player_with_role(Role::Hider)
            .unwrap_or(state.players[0].id);
        state.turn = Some(first);
        events.push(Event::Started { first_turn: first });
    }

    events
}

/// 按加入顺序补齐角色：先藏家、再猜家、其余无角色
fn next_free_role(state: &GameSnapshot) -> Role {
    if state.player_with_role(Role::Hider).is_none() {
        Role::Hider
    } else if state.player_with_role(Role::Guesser).is_none() {
        Role::Guesser
    } else {
        Role::None
    }
}

/// 应用一个回合动作
pub fn apply(
    state: &mut GameSnapshot,
    config: &GameConfig,
    id: PlayerId,
    action: Action,
) -> Result<Vec<Event>, RuleViolation> {
    let position = match action {
        Action::Hide(p) | Action::Guess(p) | Action::Move(p) => p,
    };
    if position == 0 || position > config.cup_count {
        return Err(RuleViolation::InvalidPosition {
            position,
            max: config.cup_count,
        });
    }
    if state.phase != Phase::Active {
        return Err(RuleViolation::PhaseError {
            phase: state.phase.name(),
        });
    }
    if !state.is_turn(id) {
        return Err(RuleViolation::NotYourTurn);
    }

    match action {
        Action::Hide(position) => apply_hide(state, id, position),
        Action::Guess(position) => apply_guess(state, config, id, position),
        Action::Move(position) => apply_move(state, id, position),
    }
}

fn record(state: &mut GameSnapshot, id: PlayerId, action: ActionKind, position: Position) {
    state.moves.push(MoveRecord {
        player_id: id,
        action,
        position,
        at: Utc::now(),
    });
}

fn apply_hide(
    state: &mut GameSnapshot,
    id: PlayerId,
    position: Position,
) -> Result<Vec<Event>, RuleViolation> {
    if state.role_of(id) != Role::Hider {
        return Err(RuleViolation::WrongRole);
    }

    state.secret = Some(position);
    record(state, id, ActionKind::Hide, position);

    // 回合直接交给猜家
    state.turn = state.player_with_role(Role::Guesser).or(state.turn);

    Ok(vec![Event::Hidden { by: id }])
}

fn apply_guess(
    state: &mut GameSnapshot,
    config: &GameConfig,
    id: PlayerId,
    position: Position,
) -> Result<Vec<Event>, RuleViolation> {
    if state.role_of(id) != Role::Guesser {
        return Err(RuleViolation::WrongRole);
    }

    record(state, id, ActionKind::Guess, position);

    let hit = state.secret == Some(position);
    let mut events = Vec::new();
    if hit {
        state.secret = None;
        if let Some(player) = state.player_mut(id) {
            player.score += 1;
        }
        events.push(Event::CorrectGuess { by: id, position });
    } else {
        events.push(Event::IncorrectGuess { by: id, position });
    }

    // 胜利判定
    let score = state.player(id).map(|p| p.score).unwrap_or(0);
    if hit && score >= config.win_score {
        state.phase = Phase::Finished;
        state.winner = Some(id);
        state.turn = None;
        events.push(Event::Winner { id });
        return Ok(events);
    }

    // 周期性角色轮换：每 role_swap_period 次猜测交换藏家与猜家
    let guesses = state
        .moves
        .iter()
        .filter(|m| m.action == ActionKind::Guess)
        .count() as u32;
    if config.role_swap_period > 0 && guesses % config.role_swap_period == 0 {
        swap_roles(state);
        events.push(Event::RolesSwapped);
        // 新藏家从头藏起
        state.secret = None;
        state.turn = state
            .player_with_role(Role::Hider)
            .or_else(|| state.players.first().map(|p| p.id));
    } else {
        advance_turn(state, id);
    }

    Ok(events)
}

fn apply_move(
    state: &mut GameSnapshot,
    id: PlayerId,
    position: Position,
) -> Result<Vec<Event>, RuleViolation> {
    // 通用动作不限定角色，只要求轮到自己
    record(state, id, ActionKind::Move, position);
    advance_turn(state, id);
    Ok(vec![Event::Moved { by: id, position }])
}

/// 交换藏家与猜家（其余玩家角色不变）
fn swap_roles(state: &mut GameSnapshot) {
    for player in state.players.iter_mut() {
        player.role = match player.role {
            Role::Hider => Role::Guesser,
            Role::Guesser => Role::Hider,
            Role::None => Role::None,
        };
    }
}

/// 严格按加入顺序轮转回合
fn advance_turn(state: &mut GameSnapshot, from: PlayerId) {
    if state.players.is_empty() {
        state.turn = None;
        return;
    }
    let idx = state.players.iter().position(|p| p.id == from).unwrap_or(0);
    let next = (idx + 1) % state.players.len();
    state.turn = Some(state.players[next].id);
}

/// 移除玩家并修复回合指针；玩家不存在时为无操作
pub fn leave(state: &mut GameSnapshot, config: &GameConfig, id: PlayerId) -> Vec<Event> {
    let Some(idx) = state.players.iter().position(|p| p.id == id) else {
        return Vec::new();
    };
    let removed = state.players.remove(idx);
    let mut events = vec![Event::Left {
        id,
        username: removed.username,
    }];

    // 空出的角色由最早加入的无角色玩家顶替
    if removed.role != Role::None {
        if let Some(player) = state.players.iter_mut().find(|p| p.role == Role::None) {
            player.role = removed.role;
        }
    }

    // 回合指针指向被移除玩家时，顺延到下一位幸存者
    if state.turn == Some(id) {
        if state.players.is_empty() {
            state.turn = None;
        } else {
            let next = idx % state.players.len();
            state.turn = Some(state.players[next].id);
        }
    }

    if state.phase == Phase::Active && state.players.len() < config.min_players {
        // 人数不足，回到等待阶段
        state.phase = Phase::Waiting;
        state.turn = None;
        state.secret = None;
        events.push(Event::BackToWaiting);
    } else if state.phase == Phase::Active
        && state.secret.is_none()
        && state.turn.is_some()
        && state.turn == state.player_with_role(Role::Guesser)
    {
        // 猜家无密可猜：这一轮从藏家重新开始
        if let Some(hider) = state.player_with_role(Role::Hider) {
            state.turn = Some(hider);
        }
    }

    events
}

/// 一局结束后的重置：清空比分、秘密与日志；
/// 人数足够则立即开始新一局，否则回到等待
pub fn reset_round(state: &mut GameSnapshot, config: &GameConfig) -> Vec<Event> {
    for player in state.players.iter_mut() {
        player.score = 0;
    }
    state.secret = None;
    state.moves.clear();
    state.winner = None;

    if state.players.len() >= config.min_players {
        state.phase = Phase::Active;
        let first = state
            .player_with_role(Role::Hider)
            .or_else(|| state.players.first().map(|p| p.id));
        state.turn = first;
        match first {
            Some(first_turn) => vec![Event::NewRound { first_turn }],
            None => Vec::new(),
        }
    } else {
        state.phase = Phase::Waiting;
        state.turn = None;
        vec![Event::BackToWaiting]
    }
}
