//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为句柄注册表、能力分派与所有分层实现提供唯一的错误域，保证任意层叠组合下错误语义一致；
//! - 嵌套层的失败默认原样上浮，只有显式记录的翻译规则（例如“缺失帧长度 → 连接重置”）才会改写错误。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 每个变体对应一个稳定错误码（[`codes`]）与一个分类（[`ErrorCategory`]），便于调用方按类制定重试策略；
//! - 本框架内部不做任何自动重试，重试策略完全属于调用方。

use std::{borrow::Cow, collections::TryReserveError, io};

use thiserror::Error;

use crate::handle::HandleId;

/// 可装箱的底层原因，保留编解码器等外部组件的原始错误链。
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 框架统一的结果别名。
pub type Result<T, E = MsockError> = core::result::Result<T, E>;

/// 稳定错误码集合，遵循 `<领域>.<语义>` 命名约定，可直接用于日志检索与告警聚合。
pub mod codes {
    /// 句柄表或内存等资源耗尽。
    pub const RESOURCE_EXHAUSTED: &str = "spark.msock.resource_exhausted";
    /// 句柄不支持请求的能力。
    pub const NOT_SUPPORTED: &str = "spark.msock.not_supported";
    /// 对端数据畸形，连接级失败。
    pub const CONNECTION_RESET: &str = "spark.msock.connection_reset";
    /// 消息超出接收容量。
    pub const MESSAGE_TOO_LARGE: &str = "spark.msock.message_too_large";
    /// 截止时间到期。
    pub const TIMED_OUT: &str = "spark.msock.timed_out";
    /// 对端已关闭通道。
    pub const BROKEN_PIPE: &str = "spark.msock.broken_pipe";
    /// 配置非法或无法解析。
    pub const INVALID_CONFIG: &str = "spark.msock.invalid_config";
    /// 终端传输的 I/O 失败。
    pub const IO: &str = "spark.msock.io";
    /// 内部一致性被破坏。
    pub const INTERNAL: &str = "spark.msock.internal";
}

/// 错误分类，对应调用方可采取的补救动作。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// 资源耗尽：立即上报，不重试；对象保持之前的有效状态。
    ResourceExhausted,
    /// 能力缺失：可恢复，调用方可改用其他能力或其他层。
    Unsupported,
    /// 对端数据畸形：连接级错误，不尝试局部恢复。
    MalformedPeer,
    /// 载荷超限：调用方可用更大的容量重试。
    Oversize,
    /// 截止时间到期。
    Timeout,
    /// 通道已被对端关闭。
    Closed,
    /// 配置错误。
    Configuration,
    /// 其他终端 I/O 失败。
    Io,
    /// 不变量被破坏，应视为缺陷而非运行期条件。
    Fatal,
}

/// 消息套接字框架的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“资源耗尽 / 能力缺失 / 对端畸形 / 超限 / 超时 / 内部缺陷”六类语义显式建模，
///   使压缩层、日志层与终端传输共享同一套判定方式；
/// - **契约 (What)**：所有变体 `Send + Sync + 'static`，可跨线程传播；`code()` 与 `category()` 为稳定接口；
/// - **设计权衡 (Trade-offs)**：`ConnectionReset` 携带可选的底层原因，牺牲一次装箱换取完整的排障链路。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MsockError {
    /// 句柄表已满。
    #[error("handle registry exhausted: {limit} handles are live")]
    ResourceExhausted { limit: usize },

    /// 缓冲扩容失败；发起扩容的对象保持扩容前的状态。
    #[error("failed to grow buffer to {requested} bytes")]
    AllocationFailed {
        requested: usize,
        #[source]
        cause: TryReserveError,
    },

    /// 句柄未实现请求的能力。
    #[error("handle {handle} does not support capability `{capability}`")]
    NotSupported {
        handle: HandleId,
        capability: &'static str,
    },

    /// 对端发送了畸形或不受支持的数据。
    #[error("connection reset: {reason}")]
    ConnectionReset {
        reason: Cow<'static, str>,
        #[source]
        cause: Option<BoxError>,
    },

    /// 消息声明的长度超过调用方提供的容量。
    #[error("message of {required} bytes exceeds receive capacity of {capacity} bytes")]
    MessageTooLarge { required: u64, capacity: usize },

    /// 截止时间在操作完成前到期。
    #[error("deadline expired before the operation completed")]
    TimedOut,

    /// 对端已关闭通道。
    #[error("peer has closed the channel")]
    BrokenPipe,

    /// 配置无法解析或取值非法。
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// 终端传输报告的 I/O 错误。
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// 内部一致性被破坏。
    #[error("internal invariant violated: {detail}")]
    Internal { detail: Cow<'static, str> },
}

impl MsockError {
    /// 构造不带底层原因的连接重置错误。
    pub fn connection_reset(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::ConnectionReset {
            reason: reason.into(),
            cause: None,
        }
    }

    /// 构造携带底层原因的连接重置错误。
    pub fn connection_reset_with(
        reason: impl Into<Cow<'static, str>>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self::ConnectionReset {
            reason: reason.into(),
            cause: Some(cause.into()),
        }
    }

    /// 构造内部一致性错误。
    pub fn internal(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::ResourceExhausted { .. } | Self::AllocationFailed { .. } => {
                codes::RESOURCE_EXHAUSTED
            }
            Self::NotSupported { .. } => codes::NOT_SUPPORTED,
            Self::ConnectionReset { .. } => codes::CONNECTION_RESET,
            Self::MessageTooLarge { .. } => codes::MESSAGE_TOO_LARGE,
            Self::TimedOut => codes::TIMED_OUT,
            Self::BrokenPipe => codes::BROKEN_PIPE,
            Self::InvalidConfig { .. } => codes::INVALID_CONFIG,
            Self::Io(_) => codes::IO,
            Self::Internal { .. } => codes::INTERNAL,
        }
    }

    /// 返回错误分类。
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ResourceExhausted { .. } | Self::AllocationFailed { .. } => {
                ErrorCategory::ResourceExhausted
            }
            Self::NotSupported { .. } => ErrorCategory::Unsupported,
            Self::ConnectionReset { .. } => ErrorCategory::MalformedPeer,
            Self::MessageTooLarge { .. } => ErrorCategory::Oversize,
            Self::TimedOut => ErrorCategory::Timeout,
            Self::BrokenPipe => ErrorCategory::Closed,
            Self::InvalidConfig { .. } => ErrorCategory::Configuration,
            Self::Io(err) if err.kind() == io::ErrorKind::TimedOut => ErrorCategory::Timeout,
            Self::Io(_) => ErrorCategory::Io,
            Self::Internal { .. } => ErrorCategory::Fatal,
        }
    }

    /// 是否代表不变量被破坏。
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Fatal
    }
}
