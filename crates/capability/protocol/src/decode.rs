//! 寄存器解码
//!
//! 从完整响应帧中剥离响应头，并按设备宽度把载荷转换为 [`DecodedValue`]。

use crate::frame::{FrameError, ResponseFrame};
use domain::DecodedValue;

/// 浮点文本保留的数字个数。
///
/// 按数字计数，符号与小数点不计入，因此是 6 个数字而不是 6 个字符：
/// `3.14159265` → `"3.14159"`（7 个字符），`-3.14159265` → `"-3.14159"`（8 个字符）。
pub const FLOAT_DIGITS: usize = 6;

/// 解码错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid register width: {0}")]
    InvalidWidth(u16),
    #[error("malformed response: {0}")]
    Frame(#[from] FrameError),
    #[error("plc end code 0x{0:04X}")]
    EndCode(u16),
    #[error("payload too short for width {width}: need {needed} bytes, got {actual}")]
    ShortPayload {
        width: u16,
        needed: usize,
        actual: usize,
    },
    #[error("non-finite float value")]
    NonFinite,
}

/// 寄存器宽度（决定解码方式）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWidth {
    /// 16 位无符号整数
    Word = 1,
    /// 32 位 IEEE-754 单精度浮点
    Float = 2,
    /// 取首字节最低位
    Bit = 3,
}

impl RegisterWidth {
    /// 解码所需的最少载荷字节数。
    pub fn min_payload(&self) -> usize {
        match self {
            RegisterWidth::Word => 2,
            RegisterWidth::Float => 4,
            RegisterWidth::Bit => 1,
        }
    }
}

impl TryFrom<u16> for RegisterWidth {
    type Error = DecodeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RegisterWidth::Word),
            2 => Ok(RegisterWidth::Float),
            3 => Ok(RegisterWidth::Bit),
            other => Err(DecodeError::InvalidWidth(other)),
        }
    }
}

/// 解码完整响应帧。
pub fn decode(raw: &[u8], width: u16) -> Result<DecodedValue, DecodeError> {
    let width_kind = RegisterWidth::try_from(width)?;
    let frame = ResponseFrame::parse(raw)?;
    if frame.end_code != 0 {
        return Err(DecodeError::EndCode(frame.end_code));
    }
    decode_payload(frame.payload, width_kind)
}

/// 解码已剥离响应头的载荷。
pub fn decode_payload(payload: &[u8], width: RegisterWidth) -> Result<DecodedValue, DecodeError> {
    let needed = width.min_payload();
    if payload.len() < needed {
        return Err(DecodeError::ShortPayload {
            width: width as u16,
            needed,
            actual: payload.len(),
        });
    }
    match width {
        RegisterWidth::Word => Ok(DecodedValue::UInt16(u16::from_le_bytes([
            payload[0], payload[1],
        ]))),
        RegisterWidth::Float => {
            let bits = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
            format_float(f32::from_bits(bits)).map(DecodedValue::FloatDigits)
        }
        RegisterWidth::Bit => Ok(DecodedValue::Bit(payload[0] & 0x01)),
    }
}

/// 以六位小数格式化后按数字个数截断（不四舍五入）。
pub fn format_float(value: f32) -> Result<String, DecodeError> {
    if !value.is_finite() {
        return Err(DecodeError::NonFinite);
    }
    Ok(truncate_digits(&format!("{:.6}", value), FLOAT_DIGITS))
}

/// 保留 `-` 与 `.`，数字只保留前 `max_digits` 个。
pub fn truncate_digits(formatted: &str, max_digits: usize) -> String {
    let mut out = String::with_capacity(formatted.len());
    let mut digits = 0;
    for c in formatted.chars() {
        if c == '-' || c == '.' {
            out.push(c);
        } else if digits < max_digits {
            out.push(c);
            digits += 1;
        }
    }
    out
}
