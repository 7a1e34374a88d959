use std::time::Duration;

/// 设备来源清单（决定默认的发布新鲜度策略）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// `DEVICES_16bit`
    Word,
    /// `DEVICES_32bit`
    Float,
    /// `DEVICES_2bit`
    Bit,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Word => "16bit",
            DeviceClass::Float => "32bit",
            DeviceClass::Bit => "2bit",
        }
    }
}

/// 发布新鲜度策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPolicy {
    /// 每次读取成功都发布。
    Always,
    /// 仅在值变化时发布。
    OnChange,
    /// 值变化时发布；值不变但距上次发布超过间隔时也发布。
    OnChangeOrRefresh(Duration),
}

/// 一个被轮询的 PLC 软元件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// 软元件类型代码，例如 `D`、`M`。
    pub tag: String,
    /// 起始地址。
    pub number: u16,
    /// 寄存器宽度（1 = 单字，2 = 浮点，3 = 位）。
    pub width: u16,
    pub class: DeviceClass,
}

impl Device {
    pub fn new(tag: impl Into<String>, number: u16, width: u16, class: DeviceClass) -> Self {
        Self {
            tag: tag.into(),
            number,
            width,
            class,
        }
    }

    /// 设备地址：类型代码 + 地址，例如 `D100`。
    pub fn address(&self) -> String {
        format!("{}{}", self.tag, self.number)
    }
}
