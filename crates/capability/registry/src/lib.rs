//! 设备清单解析。
//!
//! 清单格式为逗号分隔的扁平三元组：`tag,number,width,tag,number,width,...`。
//! 多份清单（按宽度类别）依次拼接为一个有序注册表，进程生命周期内不再变化。

use domain::{Device, DeviceClass};
use tracing::info;

/// 设备清单配置错误（启动期致命）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("malformed device list: {0} fields is not a multiple of 3")]
    Malformed(usize),
    #[error("invalid device field at position {position}: {value:?}")]
    InvalidField { position: usize, value: String },
    #[error("no devices configured")]
    NoDevices,
}

/// 注册表长度与各清单长度之和不一致。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device count mismatch: registry holds {actual}, device lists declare {expected}")]
pub struct IntegrityError {
    pub actual: usize,
    pub expected: usize,
}

/// 解析单份设备清单。
pub fn parse_devices(spec: &str, class: DeviceClass) -> Result<Vec<Device>, RegistryError> {
    if spec.trim().is_empty() {
        return Err(RegistryError::NoDevices);
    }
    let fields: Vec<&str> = spec.split(',').map(str::trim).collect();
    if fields.len() % 3 != 0 {
        return Err(RegistryError::Malformed(fields.len()));
    }

    fields
        .chunks_exact(3)
        .enumerate()
        .map(|(index, chunk)| {
            let position = index * 3;
            if chunk[0].is_empty() {
                return Err(RegistryError::InvalidField {
                    position,
                    value: chunk[0].to_string(),
                });
            }
            let number = parse_u16(chunk[1], position + 1)?;
            let width = parse_u16(chunk[2], position + 2)?;
            Ok(Device::new(chunk[0], number, width, class))
        })
        .collect()
}

/// 只接受十进制数字串（`u16::from_str` 会接受前导 `+`）。
fn parse_u16(value: &str, position: usize) -> Result<u16, RegistryError> {
    let invalid = || RegistryError::InvalidField {
        position,
        value: value.to_string(),
    };
    if value.starts_with('+') {
        return Err(invalid());
    }
    value.parse::<u16>().map_err(|_| invalid())
}

/// 有序、不可变的设备注册表。
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    list_lengths: Vec<(DeviceClass, usize)>,
}

impl DeviceRegistry {
    /// 依次拼接多份清单；空白或缺失的清单跳过，整体为空时报错。
    pub fn from_lists<'a, I>(lists: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (DeviceClass, Option<&'a str>)>,
    {
        let mut devices = Vec::new();
        let mut list_lengths = Vec::new();
        for (class, spec) in lists {
            let Some(spec) = spec.filter(|spec| !spec.trim().is_empty()) else {
                continue;
            };
            let parsed = parse_devices(spec, class)?;
            info!(
                target: "plcgw.registry",
                class = class.as_str(),
                count = parsed.len(),
                "device_list_loaded"
            );
            list_lengths.push((class, parsed.len()));
            devices.extend(parsed);
        }
        if devices.is_empty() {
            return Err(RegistryError::NoDevices);
        }
        Ok(Self {
            devices,
            list_lengths,
        })
    }

    /// 直接由设备与清单长度构造，不做校验。
    #[cfg(any(test, feature = "test-util"))]
    pub fn from_parts(devices: Vec<Device>, list_lengths: Vec<(DeviceClass, usize)>) -> Self {
        Self {
            devices,
            list_lengths,
        }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// 各清单解析出的设备数。
    pub fn list_lengths(&self) -> &[(DeviceClass, usize)] {
        &self.list_lengths
    }

    /// 轮询周期边界的完整性校验。
    pub fn verify_integrity(&self) -> Result<(), IntegrityError> {
        let expected: usize = self.list_lengths.iter().map(|(_, len)| len).sum();
        if expected != self.devices.len() {
            return Err(IntegrityError {
                actual: self.devices.len(),
                expected,
            });
        }
        Ok(())
    }
}
