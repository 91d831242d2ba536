//! 会话控制器
//!
//! 客户端侧的连接/重连状态机、后台接收循环与出站发送路径。
//! 后台任务持续解码入站帧并维护最近一次收到的权威快照缓存；
//! 回合动作只在缓存显示轮到自己时放行。这只是乐观检查，
//! 服务端的规则引擎仍会复核并可能拒绝。

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex};

use protocol::{
    ClientMessage, Connector, FrameReader, FrameWriter, GameSnapshot, PlayerId, Position,
    ProtocolError, ServerMessage, TcpConnector,
};

/// 重连策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 首次失败后的基础延迟
    pub base_delay: Duration,
    /// 退避延迟上限
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// 第 attempt 次失败后的退避延迟（指数增长，封顶）
    fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// 会话错误
#[derive(Error, Debug)]
pub enum SessionError {
    /// 重连预算耗尽
    #[error("Failed to connect after {attempts} attempts")]
    ConnectFailed { attempts: u32 },

    /// 尚未连接
    #[error("Not connected")]
    NotConnected,

    /// 本地乐观校验：还没轮到你
    #[error("Not your turn yet")]
    NotYourTurn,

    /// 协议错误
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Reconnecting { attempt: u32 },
    Connected,
}

/// 客户端会话控制器
#[derive(Clone, Debug)]
pub struct SessionController {
    status: Arc<StdMutex<SessionStatus>>,
    /// 最近一次收到的权威快照
    cache: Arc<StdMutex<Option<GameSnapshot>>>,
    /// join_ack 之后可用
    player_id: Arc<StdMutex<Option<PlayerId>>>,
    writer: Arc<Mutex<Option<FrameWriter<OwnedWriteHalf>>>>,
}

impl SessionController {
    /// 连接服务器，带有界重试
    ///
    /// 成功返回控制器与入站事件接收端；预算耗尽返回 ConnectFailed
    pub async fn connect(
        addr: &str,
        policy: RetryPolicy,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerMessage>), SessionError> {
        let controller = Self {
            status: Arc::new(StdMutex::new(SessionStatus::Connecting)),
            cache: Arc::new(StdMutex::new(None)),
            player_id: Arc::new(StdMutex::new(None)),
            writer: Arc::new(Mutex::new(None)),
        };

        let connector = TcpConnector;
        let mut attempt = 1u32;
        let conn = loop {
            match connector.connect(addr).await {
                Ok(conn) => break conn,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "连接失败");
                    if attempt >= policy.max_attempts {
                        controller.set_status(SessionStatus::Disconnected);
                        return Err(SessionError::ConnectFailed { attempts: attempt });
                    }
                    let delay = policy.delay_after(attempt);
                    attempt += 1;
                    controller.set_status(SessionStatus::Reconnecting { attempt });
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let (reader, writer) = conn.split();
        *controller.writer.lock().await = Some(writer);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(receive_loop(
            reader,
            Arc::clone(&controller.cache),
            Arc::clone(&controller.player_id),
            Arc::clone(&controller.status),
            events_tx,
        ));

        controller.set_status(SessionStatus::Connected);
        tracing::info!(attempt, addr, "已连接服务器");
        Ok((controller, events_rx))
    }

    fn set_status(&self, status: SessionStatus) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = status;
        }
    }

    /// 当前连接状态
    pub fn status(&self) -> SessionStatus {
        self.status
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionStatus::Disconnected)
    }

    /// 分配到的玩家 ID
    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id.lock().ok().and_then(|id| *id)
    }

    /// 最近一次收到的快照
    pub fn latest_state(&self) -> Option<GameSnapshot> {
        self.cache.lock().ok().and_then(|s| s.clone())
    }

    /// 缓存是否显示轮到自己
    pub fn is_my_turn(&self) -> bool {
        match (self.player_id(), self.latest_state()) {
            (Some(id), Some(state)) => state.is_turn(id),
            _ => false,
        }
    }

    /// 发送任意客户端消息
    pub async fn send(&self, msg: ClientMessage) -> Result<(), SessionError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SessionError::NotConnected)?;
        if let Err(e) = writer.write_frame(&msg).await {
            // 写路径坏掉即视为断开
            self.set_status(SessionStatus::Disconnected);
            return Err(SessionError::Protocol(e));
        }
        Ok(())
    }

    /// 请求加入会话
    pub async fn join(&self, username: &str) -> Result<(), SessionError> {
        self.send(ClientMessage::Join {
            username: username.to_string(),
        })
        .await
    }

    /// 藏家提交秘密位置
    pub async fn hide(&self, position: Position) -> Result<(), SessionError> {
        self.ensure_my_turn()?;
        self.send(ClientMessage::Hide { position }).await
    }

    /// 猜家尝试命中
    pub async fn guess(&self, position: Position) -> Result<(), SessionError> {
        self.ensure_my_turn()?;
        self.send(ClientMessage::Guess { position }).await
    }

    /// 通用位置动作
    pub async fn make_move(&self, position: Position) -> Result<(), SessionError> {
        self.ensure_my_turn()?;
        self.send(ClientMessage::Move { position }).await
    }

    /// 聊天
    pub async fn chat(&self, message: &str) -> Result<(), SessionError> {
        self.send(ClientMessage::Chat {
            message: message.to_string(),
        })
        .await
    }

    /// 优雅退出
    pub async fn quit(&self) -> Result<(), SessionError> {
        self.send(ClientMessage::Quit).await
    }

    fn ensure_my_turn(&self) -> Result<(), SessionError> {
        if self.player_id().is_none() {
            return Err(SessionError::NotConnected);
        }
        if !self.is_my_turn() {
            return Err(SessionError::NotYourTurn);
        }
        Ok(())
    }
}

/// 后台接收循环：更新本地缓存并把消息转发给前台
async fn receive_loop(
    mut reader: FrameReader<OwnedReadHalf>,
    cache: Arc<StdMutex<Option<GameSnapshot>>>,
    player_id: Arc<StdMutex<Option<PlayerId>>>,
    status: Arc<StdMutex<SessionStatus>>,
    events: mpsc::UnboundedSender<ServerMessage>,
) {
    loop {
        match reader.read_frame::<ServerMessage>().await {
            Ok(msg) => {
                match &msg {
                    ServerMessage::GameState { state } => {
                        if let Ok(mut cache) = cache.lock() {
                            *cache = Some(state.clone());
                        }
                    }
                    ServerMessage::JoinAck { player_id: id, .. } => {
                        if let Ok(mut player_id) = player_id.lock() {
                            *player_id = Some(*id);
                        }
                    }
                    _ => {}
                }
                // 前台消失意味着会话结束
                if events.send(msg).is_err() {
                    break;
                }
            }
            Err(e) if !e.is_fatal() => {
                tracing::warn!(error = %e, "忽略无法解析的帧");
            }
            Err(e) => {
                tracing::info!(reason = %e, "接收循环结束");
                break;
            }
        }
    }
    if let Ok(mut status) = status.lock() {
        *status = SessionStatus::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Connection, Listener, Phase, PlayerInfo, Role, TcpListener};
    use tokio::time::timeout;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        // 封顶
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(10), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_connect_failed_when_attempts_exhausted() {
        // 预留端口但不监听
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        };
        let err = SessionController::connect(&addr, policy).await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectFailed { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_reconnect_succeeds_on_third_attempt() {
        // 前两次不可达，第三次尝试前服务才出现
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let server_addr = addr.clone();
        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            let mut listener = TcpListener::bind(&server_addr).await.unwrap();
            let _conn = listener.accept().await.unwrap();
            // 保持连接直到测试结束
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let (controller, _events) = timeout(
            Duration::from_secs(5),
            SessionController::connect(&addr, fast_policy(5)),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(controller.status(), SessionStatus::Connected);
        server.abort();
    }

    #[tokio::test]
    async fn test_cache_and_optimistic_turn_check() {
        let mut listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();

            // 模拟服务端：发身份和一帧轮到玩家 1 的快照
            conn.send(&ServerMessage::JoinAck {
                player_id: 1,
                message: "Welcome, Player 1!".to_string(),
            })
            .await
            .unwrap();

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
            conn.send(&ServerMessage::GameState {
                state: state.clone(),
            })
            .await
            .unwrap();

            // 收到 hide 后把回合交给玩家 2
            let msg: ClientMessage = conn.recv().await.unwrap();
            assert_eq!(msg, ClientMessage::Hide { position: 2 });

            state.turn = Some(2);
            conn.send(&ServerMessage::GameState { state }).await.unwrap();

            // 等客户端退出
            let _ = conn.recv::<ClientMessage>().await;
        });

        let (controller, mut events) =
            SessionController::connect(&addr, fast_policy(1)).await.unwrap();

        // 等后台循环吃掉身份和第一帧快照
        loop {
            let msg = timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(&msg, ServerMessage::GameState { state } if state.turn == Some(1)) {
                break;
            }
        }

        assert_eq!(controller.player_id(), Some(1));
        assert!(controller.is_my_turn());
        assert_eq!(controller.latest_state().unwrap().turn, Some(1));

        // 轮到自己：动作放行
        controller.hide(2).await.unwrap();

        // 快照更新成对方回合后，本地检查挡下动作
        loop {
            let msg = timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(&msg, ServerMessage::GameState { state } if state.turn == Some(2)) {
                break;
            }
        }
        assert!(!controller.is_my_turn());
        let err = controller.guess(1).await.unwrap_err();
        assert!(matches!(err, SessionError::NotYourTurn));

        controller.quit().await.unwrap();
        let _ = server.await;
    }
}
