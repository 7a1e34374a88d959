//! 协议错误类型定义

use crate::frame::FrameError;

/// PLC 通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 地址解析或建连失败
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 请求或响应帧结构错误
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// PLC 返回非零结束代码
    #[error("plc end code 0x{0:04X}")]
    EndCode(u16),
}

impl ProtocolError {
    /// 是否需要丢弃当前连接（下次读取重新拨号）。
    ///
    /// 结束代码错误说明链路本身正常；请求构造失败发生在写入之前。
    pub fn resets_connection(&self) -> bool {
        match self {
            ProtocolError::Connection(_) | ProtocolError::Io(_) | ProtocolError::Timeout(_) => true,
            ProtocolError::Frame(err) => matches!(
                err,
                FrameError::TooShort(_)
                    | FrameError::SubHeader(_)
                    | FrameError::LengthMismatch { .. }
                    | FrameError::DataLengthOutOfRange(_)
            ),
            ProtocolError::EndCode(_) => false,
        }
    }
}
