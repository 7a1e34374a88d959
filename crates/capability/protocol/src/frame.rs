//! 3E 帧（二进制）编解码
//!
//! ## 批量读取请求
//!
//! ```text
//! 50 00 | 00 | FF | FF 03 | 00 | 0C 00 | 10 00 | 01 04 | 00 00 | nn nn nn | cc | pp pp
//! 副头部  网络 PC  单元IO   站号  数据长度  监视定时器 指令     子指令   起始地址   代码  点数
//! ```
//!
//! ## 响应
//!
//! ```text
//! D0 00 | 00 | FF | FF 03 | 00 | LL LL | EE EE | payload...
//! 副头部  网络 PC  单元IO   站号  数据长度  结束代码
//! ```
//!
//! 响应头共 11 字节（按十六进制文本计为 22 个字符），数据长度字段包含结束代码本身。

/// 请求副头部。
pub const REQUEST_SUB_HEADER: [u8; 2] = [0x50, 0x00];
/// 响应副头部。
pub const RESPONSE_SUB_HEADER: [u8; 2] = [0xD0, 0x00];
/// 响应中数据长度字段之前（含该字段）的固定字节数。
pub const RESPONSE_PREFIX_LEN: usize = 9;
/// 响应头长度（含结束代码）。
pub const RESPONSE_HEADER_LEN: usize = 11;
/// 结束代码长度。
pub const END_CODE_LEN: usize = 2;
/// 异常响应中结束代码之后的错误信息长度。
pub const ERROR_INFO_LEN: usize = 9;
/// 批量读取请求总长度。
pub const READ_REQUEST_LEN: usize = 21;
/// 单次批量读取的最大字点数。
pub const MAX_READ_POINTS: i64 = 960;
/// 起始地址上限（3 字节）。
pub const MAX_HEAD_DEVICE: i64 = 0xFF_FFFF;

const READ_COMMAND: u16 = 0x0401;
const READ_SUB_COMMAND_WORD: u16 = 0x0000;
/// 监视定时器 + 指令 + 子指令 + 起始地址 + 软元件代码 + 点数。
const READ_REQUEST_DATA_LEN: u16 = 12;

/// 帧结构错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("unexpected sub header: {0:02X?}")]
    SubHeader([u8; 2]),
    #[error("declared data length {declared} does not match {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("response data length {0} out of range")]
    DataLengthOutOfRange(usize),
    #[error("unknown device code: {0}")]
    UnknownDevice(String),
    #[error("head device {0} out of range")]
    HeadDeviceOutOfRange(i64),
    #[error("point count {0} out of range")]
    PointCountOutOfRange(i64),
}

/// 访问路径（本站）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Station {
    pub network: u8,
    pub pc: u8,
    pub unit_io: u16,
    pub unit_station: u8,
}

impl Station {
    /// 直连本站的默认访问路径。
    pub const fn local() -> Self {
        Self {
            network: 0x00,
            pc: 0xFF,
            unit_io: 0x03FF,
            unit_station: 0x00,
        }
    }
}

impl Default for Station {
    fn default() -> Self {
        Self::local()
    }
}

/// 软元件类型代码 → 二进制代码（Q/L 系列）。
pub fn device_code(tag: &str) -> Option<u8> {
    let code = match tag.to_ascii_uppercase().as_str() {
        "SM" => 0x91,
        "SD" => 0xA9,
        "X" => 0x9C,
        "Y" => 0x9D,
        "M" => 0x90,
        "L" => 0x92,
        "F" => 0x93,
        "V" => 0x94,
        "B" => 0xA0,
        "D" => 0xA8,
        "W" => 0xB4,
        "TS" => 0xC1,
        "TC" => 0xC0,
        "TN" => 0xC2,
        "CS" => 0xC4,
        "CC" => 0xC3,
        "CN" => 0xC5,
        "SB" => 0xA1,
        "SW" => 0xB5,
        "Z" => 0xCC,
        "R" => 0xAF,
        "ZR" => 0xB0,
        _ => return None,
    };
    Some(code)
}

/// 构造字单位批量读取请求。
pub fn build_read_request(
    station: &Station,
    monitoring_timer: u16,
    tag: &str,
    offset: i64,
    count: i64,
) -> Result<Vec<u8>, FrameError> {
    let code = device_code(tag).ok_or_else(|| FrameError::UnknownDevice(tag.to_string()))?;
    if !(0..=MAX_HEAD_DEVICE).contains(&offset) {
        return Err(FrameError::HeadDeviceOutOfRange(offset));
    }
    if !(1..=MAX_READ_POINTS).contains(&count) {
        return Err(FrameError::PointCountOutOfRange(count));
    }

    let mut frame = Vec::with_capacity(READ_REQUEST_LEN);
    frame.extend_from_slice(&REQUEST_SUB_HEADER);
    frame.push(station.network);
    frame.push(station.pc);
    frame.extend_from_slice(&station.unit_io.to_le_bytes());
    frame.push(station.unit_station);
    frame.extend_from_slice(&READ_REQUEST_DATA_LEN.to_le_bytes());
    frame.extend_from_slice(&monitoring_timer.to_le_bytes());
    frame.extend_from_slice(&READ_COMMAND.to_le_bytes());
    frame.extend_from_slice(&READ_SUB_COMMAND_WORD.to_le_bytes());
    frame.extend_from_slice(&(offset as u32).to_le_bytes()[..3]);
    frame.push(code);
    frame.extend_from_slice(&(count as u16).to_le_bytes());
    Ok(frame)
}

/// 解析后的批量读取请求（模拟器与测试使用）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub device_code: u8,
    pub head_device: u32,
    pub points: u16,
}

/// 解析批量读取请求。
pub fn parse_read_request(frame: &[u8]) -> Result<ReadRequest, FrameError> {
    if frame.len() < READ_REQUEST_LEN {
        return Err(FrameError::TooShort(frame.len()));
    }
    let sub_header = [frame[0], frame[1]];
    if sub_header != REQUEST_SUB_HEADER {
        return Err(FrameError::SubHeader(sub_header));
    }
    let declared = u16::from_le_bytes([frame[7], frame[8]]) as usize;
    let actual = frame.len() - RESPONSE_PREFIX_LEN;
    if declared != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }
    Ok(ReadRequest {
        head_device: u32::from_le_bytes([frame[15], frame[16], frame[17], 0]),
        device_code: frame[18],
        points: u16::from_le_bytes([frame[19], frame[20]]),
    })
}

/// 响应头中的固定前缀，读取剩余数据前使用。
pub fn response_data_len(prefix: &[u8]) -> Result<usize, FrameError> {
    if prefix.len() < RESPONSE_PREFIX_LEN {
        return Err(FrameError::TooShort(prefix.len()));
    }
    let sub_header = [prefix[0], prefix[1]];
    if sub_header != RESPONSE_SUB_HEADER {
        return Err(FrameError::SubHeader(sub_header));
    }
    Ok(u16::from_le_bytes([prefix[7], prefix[8]]) as usize)
}

/// 一个完整的响应帧视图。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFrame<'a> {
    pub end_code: u16,
    pub payload: &'a [u8],
}

impl<'a> ResponseFrame<'a> {
    /// 校验并剥离响应头。
    pub fn parse(frame: &'a [u8]) -> Result<Self, FrameError> {
        if frame.len() < RESPONSE_HEADER_LEN {
            return Err(FrameError::TooShort(frame.len()));
        }
        let declared = response_data_len(frame)?;
        let actual = frame.len() - RESPONSE_PREFIX_LEN;
        if declared != actual {
            return Err(FrameError::LengthMismatch { declared, actual });
        }
        Ok(Self {
            end_code: u16::from_le_bytes([frame[9], frame[10]]),
            payload: &frame[RESPONSE_HEADER_LEN..],
        })
    }
}

/// 组装响应帧（模拟器与测试使用）。
pub fn encode_response(station: &Station, end_code: u16, data: &[u8]) -> Vec<u8> {
    let data_len = (END_CODE_LEN + data.len()) as u16;
    let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + data.len());
    frame.extend_from_slice(&RESPONSE_SUB_HEADER);
    frame.push(station.network);
    frame.push(station.pc);
    frame.extend_from_slice(&station.unit_io.to_le_bytes());
    frame.push(station.unit_station);
    frame.extend_from_slice(&data_len.to_le_bytes());
    frame.extend_from_slice(&end_code.to_le_bytes());
    frame.extend_from_slice(data);
    frame
}
