//! 连接句柄
//!
//! 每个客户端一个。出站帧经 mpsc 通道交给专职写任务串行写出，
//! 因此 `send` 天然线程安全；写任务退出后 `send` 返回 ConnectionClosed。

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use protocol::{FrameWriter, ProtocolError, Result, ServerMessage};

/// 出站队列深度
const SEND_QUEUE_DEPTH: usize = 64;

/// 连接句柄（可克隆，发送端共享）
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<ServerMessage>,
    /// 远端地址（日志用）
    peer: String,
}

impl ConnectionHandle {
    /// 创建句柄并启动专职写任务
    pub fn spawn<W>(writer: FrameWriter<W>, peer: String) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        tokio::spawn(write_loop(writer, rx, peer.clone()));
        Self { tx, peer }
    }

    /// 测试用：从裸通道构造句柄，不带写任务
    #[cfg(test)]
    pub(crate) fn from_sender(tx: mpsc::Sender<ServerMessage>, peer: String) -> Self {
        Self { tx, peer }
    }

    /// 发送消息；对端消失后返回 ConnectionClosed
    pub async fn send(&self, msg: ServerMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// 远端地址
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// 专职写任务：串行化该连接的所有出站帧
async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::Receiver<ServerMessage>,
    peer: String,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    while let Some(msg) = rx.recv().await {
        if let Err(e) = writer.write_frame(&msg).await {
            tracing::warn!(peer = %peer, error = %e, "写出失败，停止该连接的写任务");
            break;
        }
    }
    // 通道耗尽或写出失败：任务退出，后续 send 都会得到 ConnectionClosed
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::FrameReader;

    #[tokio::test]
    async fn test_handle_writes_frames() {
        let (tx, rx) = tokio::io::duplex(1024);
        let handle = ConnectionHandle::spawn(FrameWriter::new(tx), "test".to_string());

        handle
            .send(ServerMessage::Message {
                text: "hello".to_string(),
            })
            .await
            .unwrap();

        let mut reader = FrameReader::new(rx);
        let msg: ServerMessage = reader.read_frame().await.unwrap();
        assert_eq!(
            msg,
            ServerMessage::Message {
                text: "hello".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_send_after_writer_gone_fails() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = ConnectionHandle::from_sender(tx, "test".to_string());

        let err = handle
            .send(ServerMessage::Message {
                text: "lost".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }
}
