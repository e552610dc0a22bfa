//! 配置模型：注册表容量与 TOML 装载入口。
//!
//! 各层自身的配置（压缩块大小、日志级别等）由对应 crate 定义，统一通过 [`from_toml_str`] 解析，
//! 以便解析失败时得到相同的 [`MsockError::InvalidConfig`] 语义。

use serde::{Deserialize, de::DeserializeOwned};

use crate::error::{MsockError, Result};

/// 默认句柄表容量。
pub const DEFAULT_MAX_HANDLES: usize = 1024;

/// 句柄注册表配置。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// 同时存活的句柄上限，必须大于 0。
    pub max_handles: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_handles: DEFAULT_MAX_HANDLES,
        }
    }
}

impl RegistryConfig {
    /// 校验取值范围。
    pub fn validate(&self) -> Result<()> {
        if self.max_handles == 0 {
            return Err(MsockError::InvalidConfig {
                reason: "registry.max_handles must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}

/// 从 TOML 文本解析任意配置结构。
pub fn from_toml_str<T: DeserializeOwned>(source: &str) -> Result<T> {
    toml::from_str(source).map_err(|err| MsockError::InvalidConfig {
        reason: err.to_string(),
    })
}
