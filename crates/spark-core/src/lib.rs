#![deny(unsafe_code)]
#![doc = "spark-core: 可组合消息套接字分层框架的核心契约。"]
#![doc = ""]
#![doc = "== 分层模型 =="]
#![doc = "每个协议层（压缩、追踪、以及未来的分帧/安全层）都包装恰好一个底层句柄，并以相同的句柄接口向上暴露能力。"]
#![doc = "调用链路：调用方 → 通用多路分派（[`msock`]）→ 句柄能力查询（[`capability`]）→ 层实现 → 递归调用底层句柄 → 终端传输。"]
#![doc = ""]
#![doc = "== 所有权约定 =="]
#![doc = "层对象独占其底层 [`Handle`]：`start` 转移所有权，`stop` 原样归还，`close` 级联关闭且恰好一次。"]
#![doc = "所有操作均以 `&mut Handle` 进行，同一句柄的并发使用在编译期即被拒绝。"]

pub mod buffer;
pub mod capability;
pub mod config;
pub mod contract;
pub mod error;
pub mod handle;
pub mod msock;
/// 测试桩命名空间，集中暴露框架官方维护的终端传输与空能力对象，供集成测试与上层 crate 复用。
///
/// # 设计背景（Why）
/// - 分层实现的契约测试都需要一个“最底层”的消息通道；统一维护可避免各 crate 重复编写内存管道；
/// - 当核心契约演进时，通过单点更新保证所有测试同步适配。
///
/// # 使用方式（How）
/// - `spark_core::test_stubs::memory::pair` 创建一对互联的内存消息端点；
/// - `spark_core::test_stubs::InertObject` 用于验证“能力缺失”分支。
pub mod test_stubs;

pub use buffer::GrowBuffer;
pub use capability::{Capability, CapabilityMarker, CapabilityToken, Closable};
pub use config::RegistryConfig;
pub use contract::Deadline;
pub use error::{ErrorCategory, MsockError, Result};
pub use handle::{Handle, HandleId, HandleSlot, Registry, Rejected};
pub use msock::{MessageSocket, MessageSocketCapability};
