//! 分层栈组合配置。
//!
//! 一份 TOML 文档同时描述注册表容量与两个层的参数，所有段落均可省略：
//!
//! ```toml
//! [registry]
//! max_handles = 256
//!
//! [compression]
//! block_size = "256KiB"
//! content_checksum = true
//!
//! [logging]
//! level = "debug"
//! ```

use serde::Deserialize;
use spark_core::{Handle, Registry, RegistryConfig, Rejected, Result};

use crate::{
    compression::{CompressionConfig, CompressionSocket},
    logging::{LoggingConfig, LoggingSocket},
};

/// 注册表与各层配置的聚合。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerStackConfig {
    pub registry: RegistryConfig,
    pub compression: CompressionConfig,
    pub logging: LoggingConfig,
}

impl LayerStackConfig {
    /// 解析并校验配置文档。
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = spark_core::config::from_toml_str(source)?;
        config.registry.validate()?;
        Ok(config)
    }

    /// 按 `registry` 段构造注册表。
    pub fn build_registry(&self) -> Result<Registry> {
        Registry::new(self.registry.clone())
    }

    /// 在 `underlying` 之上依次叠加压缩层与追踪层，返回最上层句柄。
    ///
    /// 任何一步被拒绝时，已建立的层会被拆除，`Rejected` 中交还的始终是调用方传入的底层句柄。
    pub fn start_stack(&self, underlying: Handle) -> core::result::Result<Handle, Rejected> {
        let compressed = CompressionSocket::start_with(underlying, self.compression)?;
        match LoggingSocket::start_with(compressed, self.logging) {
            Ok(top) => Ok(top),
            Err(rejected) => {
                let (error, compressed) = rejected.into_parts();
                match CompressionSocket::stop(compressed) {
                    Ok(underlying) => Err(Rejected::new(error, underlying)),
                    Err(stop_rejected) => Err(stop_rejected),
                }
            }
        }
    }
}
