//! 采集网关共享的领域模型。

pub mod data;
pub mod device;

pub use data::{DecodedValue, OutboundMessage};
pub use device::{Device, DeviceClass, PublishPolicy};
