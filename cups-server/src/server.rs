//! 服务器主逻辑
//!
//! 接入循环为每个连接生成一个并发任务；接收循环解码入站帧并
//! 派发给状态仓库，产生的事件在锁外统一转成广播。join 完成之前
//! 连接是匿名的，不持有 PlayerId。

use std::sync::Arc;

use anyhow::Result;
use tokio::net::tcp::OwnedReadHalf;

use protocol::{
    ClientMessage, Connection, ErrorCode, FrameReader, Listener, PlayerId, ServerMessage,
    TcpConnection, TcpListener,
};

use crate::config::{GameConfig, ServerConfig};
use crate::connection::ConnectionHandle;
use crate::registry::SessionRegistry;
use crate::rules::{Action, Event};
use crate::store::GameStore;

/// 服务器共享上下文
///
/// 进程启动时构造一次，显式传给每个连接任务
pub struct ServerContext {
    pub store: GameStore,
    pub registry: SessionRegistry,
    pub config: ServerConfig,
}

/// 会话服务器
pub struct Server {
    context: Arc<ServerContext>,
}

impl Server {
    pub fn new(config: ServerConfig, game: GameConfig) -> Self {
        Self {
            context: Arc::new(ServerContext {
                store: GameStore::new(game),
                registry: SessionRegistry::new(),
                config,
            }),
        }
    }

    /// 共享上下文
    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.context)
    }

    /// 绑定配置的地址并开始服务
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.context.config.addr()).await?;
        if let Some(addr) = listener.local_addr() {
            tracing::info!(%addr, "服务端开始监听");
        }
        self.serve(listener).await
    }

    /// 在已绑定的监听器上服务
    pub async fn serve(&self, mut listener: TcpListener) -> Result<()> {
        loop {
            let conn = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "接受连接失败");
                    continue;
                }
            };

            if self.context.registry.len() >= self.context.config.max_connections {
                // 礼貌拒绝：回一条错误后关闭
                let mut conn = conn;
                let _ = conn
                    .send(&ServerMessage::Error {
                        code: ErrorCode::ServerFull,
                        message: "Server is full".to_string(),
                    })
                    .await;
                continue;
            }

            let context = Arc::clone(&self.context);
            tokio::spawn(async move {
                handle_connection(context, conn).await;
            });
        }
    }
}

/// 单连接处理：先完成 join，再进入接收循环；
/// 循环退出后清理恰好一次（注销与移除都幂等）
async fn handle_connection(context: Arc<ServerContext>, conn: TcpConnection) {
    let peer = conn.peer_addr().unwrap_or_else(|| "unknown".to_string());
    tracing::info!(peer = %peer, "新连接");

    let (mut reader, writer) = conn.split();
    let handle = ConnectionHandle::spawn(writer, peer.clone());

    let Some(player_id) = wait_for_join(&context, &mut reader, &handle, &peer).await else {
        tracing::info!(peer = %peer, "连接在加入前结束");
        return;
    };

    receive_loop(&context, &mut reader, &handle, player_id).await;

    teardown(&context, player_id, &peer).await;
}

/// 等待第一条 join；加入之前的其他消息都被拒绝
async fn wait_for_join(
    context: &ServerContext,
    reader: &mut FrameReader<OwnedReadHalf>,
    handle: &ConnectionHandle,
    peer: &str,
) -> Option<PlayerId> {
    loop {
        match reader.read_frame::<ClientMessage>().await {
            Ok(ClientMessage::Join { username }) => {
                match context.store.join(&username, Some(peer.to_string())) {
                    Ok((id, events)) => {
                        context.registry.register(id, handle.clone());
                        let _ = handle
                            .send(ServerMessage::JoinAck {
                                player_id: id,
                                message: format!("Welcome, Player {}!", id),
                            })
                            .await;
                        tracing::info!(peer = %peer, player = id, username = %username, "玩家加入");
                        publish(context, events).await;
                        return Some(id);
                    }
                    Err(e) => {
                        send_error(handle, ErrorCode::InvalidUsername, &e.to_string()).await;
                    }
                }
            }
            Ok(ClientMessage::Quit) => {
                let _ = handle
                    .send(ServerMessage::QuitAck {
                        message: "Goodbye!".to_string(),
                    })
                    .await;
                return None;
            }
            Ok(_) => {
                send_error(handle, ErrorCode::NotJoined, "Join the game first").await;
            }
            Err(e) if e.is_fatal() => return None,
            Err(e) => {
                send_error(handle, ErrorCode::Malformed, &e.to_string()).await;
            }
        }
    }
}

/// 接收循环：解码入站帧并派发，直到对端关闭或发生致命错误
async fn receive_loop(
    context: &ServerContext,
    reader: &mut FrameReader<OwnedReadHalf>,
    handle: &ConnectionHandle,
    player_id: PlayerId,
) {
    loop {
        match reader.read_frame::<ClientMessage>().await {
            Ok(ClientMessage::Join { .. }) => {
                send_error(handle, ErrorCode::AlreadyJoined, "Already joined").await;
            }
            Ok(ClientMessage::Hide { position }) => {
                dispatch_action(context, handle, player_id, Action::Hide(position)).await;
            }
            Ok(ClientMessage::Guess { position }) => {
                dispatch_action(context, handle, player_id, Action::Guess(position)).await;
            }
            Ok(ClientMessage::Move { position }) => {
                dispatch_action(context, handle, player_id, Action::Move(position)).await;
            }
            Ok(ClientMessage::Chat { message }) => {
                let name = context
                    .store
                    .username_of(player_id)
                    .unwrap_or_else(|| format!("Player {}", player_id));
                context
                    .registry
                    .broadcast(ServerMessage::Message {
                        text: format!("{}: {}", name, message),
                    })
                    .await;
            }
            Ok(ClientMessage::Quit) => {
                let _ = handle
                    .send(ServerMessage::QuitAck {
                        message: format!("Goodbye, Player {}!", player_id),
                    })
                    .await;
                tracing::info!(player = player_id, "玩家退出");
                return;
            }
            Err(e) if e.is_fatal() => {
                tracing::info!(player = player_id, reason = %e, "接收循环结束");
                return;
            }
            Err(e) => {
                // 单帧解码失败：丢帧不断线
                send_error(handle, ErrorCode::Malformed, &e.to_string()).await;
            }
        }
    }
}

/// 派发一个回合动作；拒绝只回给动作发起者，不影响其他玩家
async fn dispatch_action(
    context: &ServerContext,
    handle: &ConnectionHandle,
    player_id: PlayerId,
    action: Action,
) {
    match context.store.apply(player_id, action) {
        Ok(events) => publish(context, events).await,
        Err(violation) => {
            send_error(handle, violation.code(), &violation.to_string()).await;
        }
    }
}

async fn send_error(handle: &ConnectionHandle, code: ErrorCode, message: &str) {
    let _ = handle
        .send(ServerMessage::Error {
            code,
            message: message.to_string(),
        })
        .await;
}

/// 连接清理：注销、移除玩家、修复回合并广播新状态。
/// 从接收循环退出或发送失败路径触发都安全（两步都幂等）
async fn teardown(context: &ServerContext, player_id: PlayerId, peer: &str) {
    let was_registered = context.registry.unregister(player_id);
    let events = context.store.leave(player_id);
    if !was_registered && events.is_empty() {
        return;
    }
    tracing::info!(peer = %peer, player = player_id, "连接清理完成");
    publish(context, events).await;
}

/// 把规则事件转成通知广播，然后广播每人一份的脱敏快照。
/// 一局分出胜负时自动重置并再广播一次
async fn publish(context: &ServerContext, events: Vec<Event>) {
    let won = events
        .iter()
        .any(|event| matches!(event, Event::Winner { .. }));

    for event in &events {
        if let Some(text) = event_text(event) {
            context
                .registry
                .broadcast(ServerMessage::Message { text })
                .await;
        }
    }
    broadcast_state(context).await;

    if won {
        let reset_events = context.store.reset_round();
        for event in &reset_events {
            if let Some(text) = event_text(event) {
                context
                    .registry
                    .broadcast(ServerMessage::Message { text })
                    .await;
            }
        }
        broadcast_state(context).await;
    }
}

/// 广播权威快照：每个玩家收到各自的脱敏视图
async fn broadcast_state(context: &ServerContext) {
    for (id, state) in context.store.snapshots_per_player() {
        context
            .registry
            .send_to(id, ServerMessage::GameState { state })
            .await;
    }
}

/// 事件通知文本
fn event_text(event: &Event) -> Option<String> {
    match event {
        Event::Joined { id, username } => {
            Some(format!("Player {} ({}) joined the game.", id, username))
        }
        Event::Started { first_turn } => {
            Some(format!("Game on! Player {} hides first.", first_turn))
        }
        Event::Hidden { by } => Some(format!("Player {} hid the marker.", by)),
        Event::CorrectGuess { by, .. } => Some(format!("Player {} guessed correctly!", by)),
        Event::IncorrectGuess { by, position } => {
            Some(format!("Player {} guessed cup {}: no luck.", by, position))
        }
        Event::Moved { by, position } => {
            Some(format!("Player {} moved to position {}.", by, position))
        }
        Event::RolesSwapped => Some("Roles swapped: hider and guesser trade places.".to_string()),
        Event::Winner { id } => Some(format!("Player {} wins the game!", id)),
        Event::Left { id, username } => {
            Some(format!("Player {} ({}) left the game.", id, username))
        }
        Event::BackToWaiting => Some("Waiting for more players...".to_string()),
        Event::NewRound { first_turn } => {
            Some(format!("New round! Player {} hides first.", first_turn))
        }
    }
}
