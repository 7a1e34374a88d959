use serde::Serialize;

/// 单次轮询解码得到的寄存器值。
///
/// 序列化为 JSON 时不带标签：`UInt16`/`Bit` 输出数字，`FloatDigits` 输出字符串。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    /// 单字寄存器（16 位无符号）。
    UInt16(u16),
    /// 双字浮点，按有效数字截断后的十进制文本。
    FloatDigits(String),
    /// 位软元件，0 或 1。
    Bit(u8),
}

impl std::fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodedValue::UInt16(v) => write!(f, "{}", v),
            DecodedValue::FloatDigits(v) => f.write_str(v),
            DecodedValue::Bit(v) => write!(f, "{}", v),
        }
    }
}

/// 读取任务投递给发布工作池的消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub address: String,
    pub value: DecodedValue,
}

impl OutboundMessage {
    pub fn new(address: impl Into<String>, value: DecodedValue) -> Self {
        Self {
            address: address.into(),
            value,
        }
    }
}
