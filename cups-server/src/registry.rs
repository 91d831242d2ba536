//! 会话注册表
//!
//! 玩家 ID 到连接句柄的映射。广播前先取句柄快照再迭代，
//! 并发的注册/注销不会影响一次进行中的投递。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use protocol::{PlayerId, ServerMessage};

use crate::connection::ConnectionHandle;

/// 会话注册表（可克隆句柄）
#[derive(Clone, Default)]
pub struct SessionRegistry {
    handles: Arc<Mutex<HashMap<PlayerId, ConnectionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PlayerId, ConnectionHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 注册连接
    pub fn register(&self, id: PlayerId, handle: ConnectionHandle) {
        self.lock().insert(id, handle);
    }

    /// 注销连接（幂等：不存在时为无操作）
    ///
    /// 返回此前是否确实注册过
    pub fn unregister(&self, id: PlayerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// 当前注册数
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 句柄快照；锁在拷贝完成后立即释放
    fn snapshot(&self) -> Vec<(PlayerId, ConnectionHandle)> {
        self.lock()
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect()
    }

    /// 给单个玩家发消息；失败注销该连接
    pub async fn send_to(&self, id: PlayerId, msg: ServerMessage) {
        let handle = self.lock().get(&id).cloned();
        if let Some(handle) = handle {
            if let Err(e) = handle.send(msg).await {
                tracing::warn!(player = id, error = %e, "投递失败，注销该连接");
                self.unregister(id);
            }
        }
    }

    /// 广播给所有已注册连接
    ///
    /// 对某个句柄的发送失败只注销该句柄，不影响其余投递
    pub async fn broadcast(&self, msg: ServerMessage) {
        for (id, handle) in self.snapshot() {
            if let Err(e) = handle.send(msg.clone()).await {
                tracing::warn!(player = id, error = %e, "广播投递失败，注销该连接");
                self.unregister(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{FrameReader, FrameWriter};
    use tokio::sync::mpsc;

    fn healthy_handle() -> (ConnectionHandle, FrameReader<tokio::io::DuplexStream>) {
        let (tx, rx) = tokio::io::duplex(4096);
        let handle = ConnectionHandle::spawn(FrameWriter::new(tx), "test".to_string());
        (handle, FrameReader::new(rx))
    }

    fn dead_handle() -> ConnectionHandle {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        ConnectionHandle::from_sender(tx, "dead".to_string())
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = SessionRegistry::new();
        let (handle, _reader) = healthy_handle();

        registry.register(1, handle);
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(1));
        // 再次注销同一 ID 是无操作，不是错误
        assert!(!registry.unregister(1));
        assert!(!registry.unregister(42));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failed_handle() {
        let registry = SessionRegistry::new();
        let (good, mut reader) = healthy_handle();

        registry.register(1, dead_handle());
        registry.register(2, good);

        registry
            .broadcast(ServerMessage::Message {
                text: "to everyone".to_string(),
            })
            .await;

        // 坏句柄被注销，好句柄照常收到
        assert_eq!(registry.len(), 1);
        let msg: ServerMessage = reader.read_frame().await.unwrap();
        assert_eq!(
            msg,
            ServerMessage::Message {
                text: "to everyone".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_send_to_missing_player_is_noop() {
        let registry = SessionRegistry::new();
        registry
            .send_to(
                99,
                ServerMessage::Message {
                    text: "nobody home".to_string(),
                },
            )
            .await;
        assert!(registry.is_empty());
    }
}
