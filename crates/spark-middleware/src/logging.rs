//! 透明追踪层：记录每条经过的消息，不改变任何数据、长度或错误。
//!
//! # 教案式说明
//! - **意图（Why）**：在任意两层之间插入一个观测点，直接看到线上的原始字节，用于排查分层组合问题；
//! - **结构（How）**：发送时先生成 [`TraceRecord`] 再转发；接收时先转发，成功后按实际收到的字节生成记录；
//!   记录交给 [`TraceSink`]，默认的 [`TracingSink`] 把每条记录写成一个 `tracing` 事件；
//! - **契约（What）**：
//!   - 发送记录在转发前产生，无论底层结果如何都会出现；
//!   - 接收失败时不产生记录；成功时记录长度等于返回值，而非调用方提供的容量；
//!   - 底层的返回值与错误原样上浮；
//! - **风险提示（Trade-offs）**：记录包含完整十六进制载荷，大消息会产生等比例的日志量，
//!   生产环境应在订阅端按 `spark.middleware.logging` 目标过滤。

use std::{
    fmt,
    io::{IoSlice, IoSliceMut},
};

use serde::Deserialize;
use spark_core::{
    Capability, CapabilityMarker, CapabilityToken, Closable, Deadline, Handle, HandleId,
    MessageSocket, MessageSocketCapability, MsockError, Rejected, Result, msock,
};
use tracing::Level;

const TARGET: &str = "spark.middleware.logging";

/// 消息方向。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

impl Direction {
    /// 渲染时使用的方向名（`send` / `recv`）。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Recv => "recv",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条追踪记录，借用消息所在的分段。
#[derive(Clone, Debug)]
pub struct TraceRecord<'a> {
    handle: HandleId,
    direction: Direction,
    len: usize,
    chunks: Vec<&'a [u8]>,
}

impl<'a> TraceRecord<'a> {
    /// 构造记录；`len` 为消息字节数，`chunks` 按顺序拼接即为消息内容。
    pub fn new(handle: HandleId, direction: Direction, len: usize, chunks: Vec<&'a [u8]>) -> Self {
        Self {
            handle,
            direction,
            len,
            chunks,
        }
    }

    /// 追踪层自身的句柄编号。
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 消息字节数。
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 消息所在的非空分段，按顺序排列。
    pub fn chunks(&self) -> &[&'a [u8]] {
        &self.chunks
    }

    /// 全部字节的小写十六进制表示。
    pub fn hex(&self) -> String {
        let mut out = String::with_capacity(self.len * 2);
        for chunk in &self.chunks {
            out.push_str(&hex::encode(chunk));
        }
        out
    }

    /// 单行文本形式：`handle: 3    send        5B: 0x68656c6c6f`。
    pub fn render(&self) -> String {
        format!(
            "handle: {:<4} {} {:>8}B: 0x{}",
            self.handle,
            self.direction,
            self.len,
            self.hex()
        )
    }
}

/// 追踪记录的去向。
pub trait TraceSink: Send {
    fn record(&mut self, record: &TraceRecord<'_>);
}

impl<F> TraceSink for F
where
    F: FnMut(&TraceRecord<'_>) + Send,
{
    fn record(&mut self, record: &TraceRecord<'_>) {
        (self)(record)
    }
}

/// 追踪事件的级别。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<TraceLevel> for Level {
    fn from(value: TraceLevel) -> Self {
        match value {
            TraceLevel::Trace => Level::TRACE,
            TraceLevel::Debug => Level::DEBUG,
            TraceLevel::Info => Level::INFO,
            TraceLevel::Warn => Level::WARN,
            TraceLevel::Error => Level::ERROR,
        }
    }
}

/// 追踪层配置。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: TraceLevel,
}

/// 默认去向：每条记录一个 `tracing` 事件，目标为 `spark.middleware.logging`。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink {
    level: TraceLevel,
}

impl TracingSink {
    /// 以 `level` 级别输出每条记录。
    pub fn new(level: TraceLevel) -> Self {
        Self { level }
    }

    /// 事件级别。
    pub fn level(&self) -> TraceLevel {
        self.level
    }
}

impl TraceSink for TracingSink {
    fn record(&mut self, record: &TraceRecord<'_>) {
        // `tracing` 的级别必须是常量，逐级展开。
        macro_rules! emit {
            ($level:expr) => {
                if tracing::enabled!(target: TARGET, $level) {
                    tracing::event!(
                        target: TARGET,
                        $level,
                        handle = record.handle().get(),
                        direction = record.direction().as_str(),
                        bytes = record.len(),
                        "{}",
                        record.render()
                    );
                }
            };
        }
        match self.level {
            TraceLevel::Trace => emit!(Level::TRACE),
            TraceLevel::Debug => emit!(Level::DEBUG),
            TraceLevel::Info => emit!(Level::INFO),
            TraceLevel::Warn => emit!(Level::WARN),
            TraceLevel::Error => emit!(Level::ERROR),
        }
    }
}

/// 追踪层对象。
pub struct LoggingSocket {
    underlying: Handle,
    id: HandleId,
    sink: Box<dyn TraceSink>,
}

impl CapabilityMarker for LoggingSocket {
    const NAME: &'static str = "spark.middleware.logging";
}

impl LoggingSocket {
    /// 以默认配置（`info` 级别的 [`TracingSink`]）建立追踪层。
    pub fn start(underlying: Handle) -> core::result::Result<Handle, Rejected> {
        Self::start_with(underlying, LoggingConfig::default())
    }

    pub fn start_with(
        underlying: Handle,
        config: LoggingConfig,
    ) -> core::result::Result<Handle, Rejected> {
        Self::start_with_sink(underlying, TracingSink::new(config.level))
    }

    /// 以自定义去向建立追踪层。
    ///
    /// 拒绝条件与压缩层相同：底层不具备消息套接字能力，或注册表已满。
    pub fn start_with_sink(
        mut underlying: Handle,
        sink: impl TraceSink + 'static,
    ) -> core::result::Result<Handle, Rejected> {
        if !underlying.supports(MessageSocketCapability::token()) {
            let error = MsockError::NotSupported {
                handle: underlying.id(),
                capability: MessageSocketCapability::NAME,
            };
            return Err(Rejected::new(error, underlying));
        }
        let slot = match underlying.registry().reserve() {
            Ok(slot) => slot,
            Err(error) => return Err(Rejected::new(error, underlying)),
        };
        let id = slot.id();
        tracing::debug!(
            target: TARGET,
            handle = id.get(),
            underlying = underlying.id().get(),
            "logging layer started"
        );
        let layer = LoggingSocket {
            underlying,
            id,
            sink: Box::new(sink),
        };
        Ok(Handle::from_parts(slot, Box::new(layer)))
    }

    /// 拆除追踪层并取回底层句柄。
    pub fn stop(handle: Handle) -> core::result::Result<Handle, Rejected> {
        let id = handle.id();
        match handle.downcast::<Self>() {
            Ok(layer) => {
                tracing::debug!(target: TARGET, handle = id.get(), "logging layer stopped");
                let LoggingSocket { underlying, .. } = *layer;
                Ok(underlying)
            }
            Err(handle) => {
                let error = MsockError::NotSupported {
                    handle: id,
                    capability: Self::NAME,
                };
                Err(Rejected::new(error, handle))
            }
        }
    }

    /// 被包装的底层句柄编号。
    pub fn underlying_id(&self) -> HandleId {
        self.underlying.id()
    }
}

impl Closable for LoggingSocket {
    fn query(&mut self, token: CapabilityToken) -> Option<Capability<'_>> {
        if token == MessageSocketCapability::token() {
            Some(Capability::MessageSocket(self))
        } else if token == Self::token() {
            Some(Capability::Instance(self))
        } else {
            None
        }
    }

    fn close(self: Box<Self>) {
        tracing::debug!(target: TARGET, handle = self.id.get(), "logging layer closed");
        let LoggingSocket { underlying, .. } = *self;
        underlying.close();
    }
}

impl MessageSocket for LoggingSocket {
    fn send_vectored(&mut self, segments: &[IoSlice<'_>], deadline: Deadline) -> Result<()> {
        let chunks: Vec<&[u8]> = segments
            .iter()
            .map(|segment| &**segment)
            .filter(|chunk| !chunk.is_empty())
            .collect();
        let record = TraceRecord::new(self.id, Direction::Send, msock::total_len(segments), chunks);
        self.sink.record(&record);
        msock::send_vectored(&mut self.underlying, segments, deadline)
    }

    fn recv_vectored(
        &mut self,
        segments: &mut [IoSliceMut<'_>],
        deadline: Deadline,
    ) -> Result<usize> {
        let len = msock::recv_vectored(&mut self.underlying, segments, deadline)?;
        let record = TraceRecord::new(
            self.id,
            Direction::Recv,
            len,
            msock::filled_chunks(segments, len),
        );
        self.sink.record(&record);
        Ok(len)
    }
}
