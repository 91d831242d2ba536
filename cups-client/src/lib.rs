//! 猜杯子游戏客户端
//!
//! 包含:
//! - 会话控制器（连接/重连状态机 + 后台接收循环）
//! - 终端呈现

pub mod session;
pub mod view;

pub use session::{RetryPolicy, SessionController, SessionError, SessionStatus};
