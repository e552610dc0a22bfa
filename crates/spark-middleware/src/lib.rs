//! spark-middleware: 叠加在 `spark-core` 句柄之上的消息套接字层。
//!
//! # 教案式概览
//! - **意图（Why）**：协议层只需实现一次，即可包装任何具备消息套接字能力的句柄，并以同样的接口继续向上暴露；
//! - **结构（How）**：
//!   - [`compression`]：每条消息独立编码为一个携带内容长度的 LZ4 帧，接收端先解析帧头再决定是否解压；
//!   - [`logging`]：透明追踪层，把每次成功收发的字节以十六进制形式交给 [`logging::TraceSink`]；
//!   - [`config`]：注册表与两个层的组合配置，从一份 TOML 文档装载；
//! - **契约（What）**：每个层都独占一个底层 [`spark_core::Handle`]，`start` 失败时经由 [`spark_core::Rejected`]
//!   原样交还；`stop` 取回底层句柄；`close` 级联关闭恰好一次；
//! - **风险提示（Trade-offs）**：所有调用均为同步阻塞，截止时间由最底层传输负责兑现，层本身只透传。

#![deny(unsafe_code)]

pub mod compression;
pub mod config;
pub mod logging;

pub use compression::{CompressionConfig, CompressionSocket, FrameBlockSize};
pub use config::LayerStackConfig;
pub use logging::{
    Direction, LoggingConfig, LoggingSocket, TraceLevel, TraceRecord, TraceSink, TracingSink,
};
