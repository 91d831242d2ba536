//! 协议常量定义

use std::time::Duration;

/// 默认服务端口
pub const DEFAULT_PORT: u16 = 12345;

/// 默认杯子数量（有效位置为 1..=cup_count）
pub const DEFAULT_CUP_COUNT: u8 = 3;

/// 用户名最大长度
pub const MAX_USERNAME_LEN: usize = 20;

/// 消息帧最大大小
pub const MAX_FRAME_SIZE: usize = 65536;

/// 连续解码失败上限，达到后断开该连接
pub const MAX_CONSECUTIVE_MALFORMED: u32 = 3;

/// 服务端最大连接数
pub const MAX_CONNECTIONS: usize = 100;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
