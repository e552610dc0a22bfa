//! LZ4 压缩层：每条消息编码为一个自描述的 LZ4 帧。
//!
//! # 教案式概览
//! - **意图（Why）**：在不改变消息边界的前提下降低线上的字节量；每个帧独立可解，丢弃或损坏一条消息不会影响后续消息；
//! - **结构（How）**：
//!   - 发送：按最坏帧长扩容发送缓冲 → 各段依次写入 `FrameEncoder` → 完整帧构建完毕后一次性交给底层句柄；
//!   - 接收：按“调用方容量的最坏帧长”（与对端帧参数无关）扩容接收缓冲 → 从底层接收恰好一条消息 → 解析帧头 →
//!     声明长度合法且不超过容量时，解码器直接把明文写入调用方的分段；
//! - **契约（What）**：
//!   - 帧头缺失内容长度（或为 0）、帧头无法解析、帧体解码失败、帧体多于声明长度，均以 `ConnectionReset` 报告；
//!   - 声明长度超过调用方容量时返回 `MessageTooLarge`，解码器不被触碰；
//!   - 两个缓冲只增不减，消息尺寸稳定后不再分配；扩容失败以 `AllocationFailed` 返回，层保持原状；
//! - **风险提示（Trade-offs）**：
//!   - 零长度消息编码时不写内容长度字段（LZ4 以 0 表示未知），对端会以 `ConnectionReset` 拒绝；
//!   - 解码失败时调用方分段中可能残留部分明文，返回值为错误时其内容无意义。

pub mod frame;

use std::{
    io::{self, IoSlice, IoSliceMut, Read, Write},
    mem,
};

use lz4_flex::frame::{BlockSize, FrameDecoder, FrameEncoder, FrameInfo};
use serde::Deserialize;
use spark_core::{
    Capability, CapabilityMarker, CapabilityToken, Closable, Deadline, GrowBuffer, Handle,
    MessageSocket, MessageSocketCapability, MsockError, Rejected, Result, msock,
};

use self::frame::{FrameHeader, frame_bound, receive_bound};

const TARGET: &str = "spark.middleware.compression";

/// LZ4 帧的最大块长度。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum FrameBlockSize {
    #[default]
    #[serde(rename = "64KiB")]
    Max64KiB,
    #[serde(rename = "256KiB")]
    Max256KiB,
    #[serde(rename = "1MiB")]
    Max1MiB,
    #[serde(rename = "4MiB")]
    Max4MiB,
}

impl FrameBlockSize {
    /// 块长度（字节）。
    pub const fn bytes(self) -> usize {
        match self {
            Self::Max64KiB => 64 * 1024,
            Self::Max256KiB => 256 * 1024,
            Self::Max1MiB => 1024 * 1024,
            Self::Max4MiB => 4 * 1024 * 1024,
        }
    }
}

impl From<FrameBlockSize> for BlockSize {
    fn from(value: FrameBlockSize) -> Self {
        match value {
            FrameBlockSize::Max64KiB => BlockSize::Max64KB,
            FrameBlockSize::Max256KiB => BlockSize::Max256KB,
            FrameBlockSize::Max1MiB => BlockSize::Max1MB,
            FrameBlockSize::Max4MiB => BlockSize::Max4MB,
        }
    }
}

/// 压缩层配置。
///
/// 只影响本端编码出的帧；解码端接受任何合法的帧参数组合。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    /// 编码时使用的最大块长度，默认 64KiB。
    pub block_size: FrameBlockSize,
    /// 为每个块附加 xxHash32 校验。
    pub block_checksums: bool,
    /// 为整条消息附加 xxHash32 校验。
    pub content_checksum: bool,
}

impl CompressionConfig {
    fn frame_info(&self, len: usize) -> FrameInfo {
        let content_size = if len == 0 { None } else { Some(len as u64) };
        FrameInfo::new()
            .block_size(self.block_size.into())
            .block_checksums(self.block_checksums)
            .content_checksum(self.content_checksum)
            .content_size(content_size)
    }
}

/// 接收缓冲：持有一条底层消息，并作为解码器的字节来源。
#[derive(Debug, Default)]
struct FrameSource {
    buffer: GrowBuffer,
    filled: usize,
    position: usize,
}

impl FrameSource {
    /// 为下一条消息借出至少 `bound` 字节的接收窗口；扩容失败时缓冲保持原容量。
    fn prepare(&mut self, bound: usize) -> Result<&mut [u8]> {
        self.filled = 0;
        self.position = 0;
        self.buffer.window_mut(bound)
    }

    fn commit(&mut self, len: usize) {
        self.filled = len;
        self.position = 0;
    }

    fn message(&self) -> &[u8] {
        self.buffer.window(self.filled)
    }

    fn is_drained(&self) -> bool {
        self.position == self.filled
    }

    fn clear(&mut self) {
        self.filled = 0;
        self.position = 0;
    }
}

impl Read for FrameSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pending = &self.buffer.window(self.filled)[self.position..];
        let len = pending.len().min(buf.len());
        buf[..len].copy_from_slice(&pending[..len]);
        self.position += len;
        Ok(len)
    }
}

/// LZ4 压缩层对象。
pub struct CompressionSocket {
    underlying: Handle,
    config: CompressionConfig,
    outbound: GrowBuffer,
    decoder: FrameDecoder<FrameSource>,
    frames_encoded: u64,
    frames_decoded: u64,
}

impl CapabilityMarker for CompressionSocket {
    const NAME: &'static str = "spark.middleware.compression";
}

impl CompressionSocket {
    /// 以默认配置在 `underlying` 之上建立压缩层。
    pub fn start(underlying: Handle) -> core::result::Result<Handle, Rejected> {
        Self::start_with(underlying, CompressionConfig::default())
    }

    /// 以指定配置建立压缩层。
    ///
    /// 底层句柄不具备消息套接字能力时以 `NotSupported` 拒绝，注册表已满时以 `ResourceExhausted` 拒绝；
    /// 两种情况下底层句柄都经由 [`Rejected`] 原样交还。
    pub fn start_with(
        mut underlying: Handle,
        config: CompressionConfig,
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
        tracing::debug!(
            target: TARGET,
            handle = slot.id().get(),
            underlying = underlying.id().get(),
            block_size = config.block_size.bytes(),
            "compression layer started"
        );
        let layer = CompressionSocket {
            underlying,
            config,
            outbound: GrowBuffer::new(),
            decoder: FrameDecoder::new(FrameSource::default()),
            frames_encoded: 0,
            frames_decoded: 0,
        };
        Ok(Handle::from_parts(slot, Box::new(layer)))
    }

    /// 拆除压缩层并取回底层句柄；底层句柄保持打开。
    ///
    /// `handle` 不是压缩层时以 `NotSupported` 拒绝并原样交还。
    pub fn stop(handle: Handle) -> core::result::Result<Handle, Rejected> {
        let id = handle.id();
        match handle.downcast::<Self>() {
            Ok(layer) => {
                tracing::debug!(target: TARGET, handle = id.get(), "compression layer stopped");
                let CompressionSocket { underlying, .. } = *layer;
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

    /// 本端编码使用的帧参数。
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// 发送缓冲的当前容量。
    pub fn outbound_capacity(&self) -> usize {
        self.outbound.capacity()
    }

    /// 接收缓冲的当前容量。
    pub fn inbound_capacity(&self) -> usize {
        self.decoder.get_ref().buffer.capacity()
    }

    /// 发送缓冲累计扩容次数；消息尺寸不再增长后保持不变。
    pub fn outbound_reallocations(&self) -> usize {
        self.outbound.reallocations()
    }

    /// 接收缓冲累计扩容次数。
    pub fn inbound_reallocations(&self) -> usize {
        self.decoder.get_ref().buffer.reallocations()
    }

    /// 成功发送的帧数。
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// 成功解压的帧数。
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    fn encode(&mut self, segments: &[IoSlice<'_>], len: usize) -> Result<()> {
        self.outbound.reserve(frame_bound(len, &self.config))?;
        self.outbound.clear();
        let mut encoder =
            FrameEncoder::with_frame_info(self.config.frame_info(len), self.outbound.as_vec_mut());
        for segment in segments {
            encoder
                .write_all(segment)
                .map_err(|err| MsockError::internal(format!("lz4 frame encoding failed: {err}")))?;
        }
        encoder
            .finish()
            .map_err(|err| MsockError::internal(format!("lz4 frame encoding failed: {err}")))?;
        debug_assert!(self.outbound.as_slice().len() <= frame_bound(len, &self.config));
        Ok(())
    }

    fn decode_into(&mut self, segments: &mut [IoSliceMut<'_>], declared: usize) -> io::Result<()> {
        let mut remaining = declared;
        for segment in segments.iter_mut() {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(segment.len());
            self.decoder.read_exact(&mut segment[..take])?;
            remaining -= take;
        }
        let mut extra = [0u8; 1];
        match self.decoder.read(&mut extra)? {
            0 => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame body exceeds the declared length",
            )),
        }
    }

    // 解码器在失败后可能停留在帧中间，丢弃其状态并沿用同一接收缓冲。
    fn reset_decoder(&mut self) {
        let stale = mem::replace(&mut self.decoder, FrameDecoder::new(FrameSource::default()));
        let mut source = stale.into_inner();
        source.clear();
        self.decoder = FrameDecoder::new(source);
        tracing::debug!(
            target: TARGET,
            underlying = self.underlying.id().get(),
            "lz4 decoder reset"
        );
    }
}

impl Closable for CompressionSocket {
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
        let CompressionSocket { underlying, .. } = *self;
        tracing::debug!(
            target: TARGET,
            underlying = underlying.id().get(),
            "compression layer closed"
        );
        underlying.close();
    }
}

impl MessageSocket for CompressionSocket {
    fn send_vectored(&mut self, segments: &[IoSlice<'_>], deadline: Deadline) -> Result<()> {
        let len = msock::total_len(segments);
        self.encode(segments, len)?;
        msock::send(&mut self.underlying, self.outbound.as_slice(), deadline)?;
        self.frames_encoded += 1;
        Ok(())
    }

    fn recv_vectored(
        &mut self,
        segments: &mut [IoSliceMut<'_>],
        deadline: Deadline,
    ) -> Result<usize> {
        let capacity = msock::total_len_mut(segments);
        let window = self.decoder.get_mut().prepare(receive_bound(capacity))?;
        let received = msock::recv(&mut self.underlying, window, deadline)?;
        self.decoder.get_mut().commit(received);

        let header = match FrameHeader::parse(self.decoder.get_ref().message()) {
            Ok(header) => header,
            Err(err) => {
                self.decoder.get_mut().clear();
                return Err(MsockError::connection_reset_with(
                    "peer sent an invalid lz4 frame header",
                    err,
                ));
            }
        };
        let Some(declared) = header.declared_len() else {
            self.decoder.get_mut().clear();
            return Err(MsockError::connection_reset(
                "lz4 frame header does not declare the message length",
            ));
        };
        if declared > capacity as u64 {
            self.decoder.get_mut().clear();
            return Err(MsockError::MessageTooLarge {
                required: declared,
                capacity,
            });
        }
        let declared = declared as usize;

        if let Err(err) = self.decode_into(segments, declared) {
            self.reset_decoder();
            return Err(MsockError::connection_reset_with(
                "lz4 frame body failed to decode",
                err,
            ));
        }
        assert!(
            self.decoder.get_ref().is_drained(),
            "lz4 decoder finished a frame without consuming the whole message"
        );
        self.frames_decoded += 1;
        Ok(declared)
    }
}
