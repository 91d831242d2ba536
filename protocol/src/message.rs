//! 消息类型定义

use serde::{Deserialize, Serialize};

use crate::error::RuleViolation;
use crate::state::GameSnapshot;

/// 玩家 ID
pub type PlayerId = u64;

/// 杯子位置（1..=cup_count）
pub type Position = u8;

/// 客户端发送给服务端的消息
///
/// 线上表示为带 `type` 标签的 JSON 对象，一行一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    // === 会话 ===
    /// 请求加入会话
    Join { username: String },
    /// 主动退出
    Quit,

    // === 回合动作 ===
    /// 藏家提交秘密位置
    Hide { position: Position },
    /// 猜家尝试命中
    Guess { position: Position },
    /// 通用位置动作（简化玩法）
    Move { position: Position },

    // === 聊天 ===
    /// 自由文本，原样转发给所有人
    Chat { message: String },
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 加入成功，分配玩家身份
    JoinAck { player_id: PlayerId, message: String },
    /// 权威状态快照广播（总是整体快照，不是增量）
    GameState { state: GameSnapshot },
    /// 事件通知文本（胜利、掉线等）
    Message { text: String },
    /// 动作被拒绝的说明
    Error { code: ErrorCode, message: String },
    /// 退出确认
    QuitAck { message: String },
}

/// 错误码定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === 规则相关 ===
    /// 不是你的回合
    NotYourTurn,
    /// 角色不符
    WrongRole,
    /// 当前阶段不允许
    PhaseError,
    /// 位置越界
    InvalidPosition,

    // === 会话相关 ===
    /// 尚未加入会话
    NotJoined,
    /// 已经加入过会话
    AlreadyJoined,
    /// 无效用户名
    InvalidUsername,
    /// 服务器已满
    ServerFull,

    // === 协议相关 ===
    /// 无法解析的帧
    Malformed,

    // === 系统相关 ===
    /// 内部错误
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl RuleViolation {
    /// 对应的线上错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            RuleViolation::NotYourTurn => ErrorCode::NotYourTurn,
            RuleViolation::WrongRole => ErrorCode::WrongRole,
            RuleViolation::PhaseError { .. } => ErrorCode::PhaseError,
            RuleViolation::InvalidPosition { .. } => ErrorCode::InvalidPosition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roundtrip() {
        let msg = ClientMessage::Join {
            username: "player1".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: ClientMessage = serde_json::from_str(&json).unwrap();

        match decoded {
            ClientMessage::Join { username } => assert_eq!(username, "player1"),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_server_message_roundtrip() {
        let msg = ServerMessage::JoinAck {
            player_id: 7,
            message: "Welcome, Player 7!".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: ServerMessage = serde_json::from_str(&json).unwrap();

        match decoded {
            ServerMessage::JoinAck { player_id, .. } => assert_eq!(player_id, 7),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_wire_tags() {
        // 线上标签必须与协议表一致
        let json = serde_json::to_string(&ClientMessage::Guess { position: 2 }).unwrap();
        assert!(json.contains(r#""type":"guess""#));

        let json = serde_json::to_string(&ClientMessage::Quit).unwrap();
        assert!(json.contains(r#""type":"quit""#));

        let json = serde_json::to_string(&ServerMessage::JoinAck {
            player_id: 1,
            message: String::new(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"join_ack""#));
        assert!(json.contains(r#""player_id":1"#));

        let state = GameSnapshot::new(3);
        let json = serde_json::to_string(&ServerMessage::GameState { state }).unwrap();
        assert!(json.contains(r#""type":"game_state""#));
    }

    #[test]
    fn test_external_join_format() {
        // 能解析最朴素的客户端实现发来的 join
        let json = r#"{"type": "join", "username": "player1"}"#;
        let decoded: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            decoded,
            ClientMessage::Join {
                username: "player1".to_string()
            }
        );
    }

    #[test]
    fn test_rule_violation_codes() {
        assert_eq!(RuleViolation::NotYourTurn.code(), ErrorCode::NotYourTurn);
        assert_eq!(
            RuleViolation::PhaseError { phase: "waiting" }.code(),
            ErrorCode::PhaseError
        );
    }
}
