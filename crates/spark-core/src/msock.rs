//! Message-Socket 契约与通用多路分派入口。
//!
//! # 教案式概览
//! - **意图（Why）**：离散消息通道（整条消息发送/接收，支持分散/聚集分段与截止时间）是所有层共享的统一接口；
//!   层实现一次即可叠加在任何实现了该能力的句柄之上；
//! - **结构（How）**：[`MessageSocket`] 定义分段收发；`send`/`recv`/`send_vectored`/`recv_vectored`
//!   先通过 [`Handle::query`] 解析句柄的消息套接字能力，再原样转发（截止时间不变）；
//! - **契约（What）**：能力缺失时返回 [`MsockError::NotSupported`]；解析成功后调用的任何失败原样上浮，本层不重试。

use std::io::{IoSlice, IoSliceMut};

use crate::{
    capability::{Capability, CapabilityMarker},
    contract::Deadline,
    error::{MsockError, Result},
    handle::Handle,
};

/// 通用消息套接字能力的标记。
pub enum MessageSocketCapability {}

impl CapabilityMarker for MessageSocketCapability {
    const NAME: &'static str = "spark.msock";
}

/// 离散消息通道。
///
/// 一次 `send_vectored` 发送一条逻辑消息（各段按顺序拼接）；一次 `recv_vectored` 接收恰好一条消息，
/// 依次填充各段并返回消息长度。实现可以阻塞直至成功、失败或截止时间到期。
pub trait MessageSocket {
    /// 发送由 `segments` 拼接而成的一条消息。
    fn send_vectored(&mut self, segments: &[IoSlice<'_>], deadline: Deadline) -> Result<()>;

    /// 接收一条消息到 `segments`，返回消息的实际长度。
    fn recv_vectored(
        &mut self,
        segments: &mut [IoSliceMut<'_>],
        deadline: Deadline,
    ) -> Result<usize>;
}

fn resolve(handle: &mut Handle) -> Result<&mut dyn MessageSocket> {
    let id = handle.id();
    match handle.query(MessageSocketCapability::token()) {
        Some(Capability::MessageSocket(socket)) => Ok(socket),
        _ => Err(MsockError::NotSupported {
            handle: id,
            capability: MessageSocketCapability::NAME,
        }),
    }
}

/// 发送整块缓冲。
pub fn send(handle: &mut Handle, buf: &[u8], deadline: Deadline) -> Result<()> {
    resolve(handle)?.send_vectored(&[IoSlice::new(buf)], deadline)
}

/// 接收一条消息到整块缓冲。
pub fn recv(handle: &mut Handle, buf: &mut [u8], deadline: Deadline) -> Result<usize> {
    resolve(handle)?.recv_vectored(&mut [IoSliceMut::new(buf)], deadline)
}

/// 分段发送。
pub fn send_vectored(
    handle: &mut Handle,
    segments: &[IoSlice<'_>],
    deadline: Deadline,
) -> Result<()> {
    resolve(handle)?.send_vectored(segments, deadline)
}

/// 分段接收。
pub fn recv_vectored(
    handle: &mut Handle,
    segments: &mut [IoSliceMut<'_>],
    deadline: Deadline,
) -> Result<usize> {
    resolve(handle)?.recv_vectored(segments, deadline)
}

/// 发送段的总长度。
pub fn total_len(segments: &[IoSlice<'_>]) -> usize {
    segments.iter().map(|segment| segment.len()).sum()
}

/// 接收段的总容量。
pub fn total_len_mut(segments: &[IoSliceMut<'_>]) -> usize {
    segments.iter().map(|segment| segment.len()).sum()
}

/// 把各段按顺序追加到 `out`。
pub fn gather(segments: &[IoSlice<'_>], out: &mut Vec<u8>) {
    out.reserve(total_len(segments));
    for segment in segments {
        out.extend_from_slice(segment);
    }
}

/// 把 `bytes` 依次写入各段，返回写入的字节数（不超过段总容量）。
pub fn scatter(segments: &mut [IoSliceMut<'_>], mut bytes: &[u8]) -> usize {
    let mut written = 0;
    for segment in segments.iter_mut() {
        if bytes.is_empty() {
            break;
        }
        let take = bytes.len().min(segment.len());
        segment[..take].copy_from_slice(&bytes[..take]);
        bytes = &bytes[take..];
        written += take;
    }
    written
}

/// 返回各段中前 `len` 字节所在的切片序列，跳过空段。
pub fn filled_chunks<'a>(segments: &'a [IoSliceMut<'_>], len: usize) -> Vec<&'a [u8]> {
    let mut remaining = len;
    let mut chunks = Vec::with_capacity(segments.len());
    for segment in segments {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(segment.len());
        if take > 0 {
            chunks.push(&segment[..take]);
        }
        remaining -= take;
    }
    chunks
}
