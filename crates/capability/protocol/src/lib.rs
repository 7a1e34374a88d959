//! # PLC 通信能力模块
//!
//! 通过 3E 帧（二进制）批量读取三菱系 PLC 的软元件，并把响应解码为领域值。
//!
//! ## 架构设计
//!
//! ```text
//! Poller（每设备一个读取任务）
//!       │  RegisterReader::read(tag, offset, count)
//!       ▼
//! McClient ── Mutex<Option<TcpStream>> ── PLC
//!       │  完整响应帧
//!       ▼
//! decode(frame, width) → DecodedValue
//! ```

mod client;
mod decode;
mod error;
pub mod frame;

pub use client::{McClient, McClientConfig, RegisterReader};
pub use decode::{DecodeError, FLOAT_DIGITS, RegisterWidth, decode, decode_payload, format_float, truncate_digits};
pub use error::ProtocolError;
pub use frame::{FrameError, Station, device_code};
