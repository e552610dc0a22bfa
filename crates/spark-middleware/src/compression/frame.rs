//! LZ4 帧头解析与最坏帧长估算。
//!
//! 接收路径必须在解压之前得知消息的声明长度，才能在不触碰解码器的前提下拒绝超长消息；
//! 因此帧头由本模块独立解析，帧体仍交给 `lz4_flex` 的流式解码器。
//!
//! 帧头布局（小端）：`magic:4 | FLG:1 | BD:1 | content_size:8? | dict_id:4? | HC:1`。
//! 头部校验字节（HC）只被读取，校验由解码器在解压阶段完成。

use std::ops::RangeInclusive;

use thiserror::Error;

use super::{CompressionConfig, FrameBlockSize};

/// LZ4 帧魔数。
pub const MAGIC: u32 = 0x184D_2204;

/// 可跳过帧的魔数区间。
const SKIPPABLE_MAGIC: RangeInclusive<u32> = 0x184D_2A50..=0x184D_2A5F;

/// 帧头的最大长度：魔数、FLG、BD、内容长度、字典编号与 HC。
pub const MAX_HEADER_LEN: usize = 4 + 2 + 8 + 4 + 1;

const VERSION: u8 = 0b01;
const FLG_BLOCK_INDEPENDENCE: u8 = 0x20;
const FLG_BLOCK_CHECKSUM: u8 = 0x10;
const FLG_CONTENT_SIZE: u8 = 0x08;
const FLG_CONTENT_CHECKSUM: u8 = 0x04;
const FLG_DICT_ID: u8 = 0x01;

// 块长度字段与帧尾标记各 4 字节，校验和同样为 4 字节。
const BLOCK_SIZE_FIELD: usize = 4;
const CHECKSUM_LEN: usize = 4;
const END_MARK_LEN: usize = 4;

/// 帧头解析失败的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FrameError {
    #[error("lz4 frame header is truncated")]
    Truncated,
    #[error("not an lz4 frame (magic 0x{found:08x})")]
    BadMagic { found: u32 },
    #[error("skippable lz4 frame carries no message")]
    Skippable,
    #[error("unsupported lz4 frame version {version}")]
    UnsupportedVersion { version: u8 },
}

/// 解析后的帧头。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    flags: u8,
    block_descriptor: u8,
    content_size: Option<u64>,
    dict_id: Option<u32>,
    header_checksum: u8,
    len: usize,
}

impl FrameHeader {
    /// 从消息起始处解析帧头。`bytes` 可以包含帧体，多余部分被忽略。
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut rest = bytes;
        let magic = u32::from_le_bytes(take::<4>(&mut rest)?);
        if SKIPPABLE_MAGIC.contains(&magic) {
            return Err(FrameError::Skippable);
        }
        if magic != MAGIC {
            return Err(FrameError::BadMagic { found: magic });
        }
        let [flags, block_descriptor] = take::<2>(&mut rest)?;
        let version = flags >> 6;
        if version != VERSION {
            return Err(FrameError::UnsupportedVersion { version });
        }
        let content_size = if flags & FLG_CONTENT_SIZE != 0 {
            Some(u64::from_le_bytes(take::<8>(&mut rest)?))
        } else {
            None
        };
        let dict_id = if flags & FLG_DICT_ID != 0 {
            Some(u32::from_le_bytes(take::<4>(&mut rest)?))
        } else {
            None
        };
        let [header_checksum] = take::<1>(&mut rest)?;
        Ok(Self {
            flags,
            block_descriptor,
            content_size,
            dict_id,
            header_checksum,
            len: bytes.len() - rest.len(),
        })
    }

    /// 声明的消息长度；字段缺失或为 0（LZ4 以 0 表示“未知”）时返回 `None`。
    pub fn declared_len(&self) -> Option<u64> {
        self.content_size.filter(|&len| len != 0)
    }

    /// 帧头中的原始内容长度字段。
    pub fn content_size(&self) -> Option<u64> {
        self.content_size
    }

    pub fn dict_id(&self) -> Option<u32> {
        self.dict_id
    }

    pub fn independent_blocks(&self) -> bool {
        self.flags & FLG_BLOCK_INDEPENDENCE != 0
    }

    pub fn block_checksums(&self) -> bool {
        self.flags & FLG_BLOCK_CHECKSUM != 0
    }

    pub fn content_checksum(&self) -> bool {
        self.flags & FLG_CONTENT_CHECKSUM != 0
    }

    /// BD 字节声明的最大块长度；保留取值返回 `None`。
    pub fn block_max_size(&self) -> Option<usize> {
        match (self.block_descriptor >> 4) & 0x07 {
            4 => Some(64 * 1024),
            5 => Some(256 * 1024),
            6 => Some(1024 * 1024),
            7 => Some(4 * 1024 * 1024),
            _ => None,
        }
    }

    pub fn header_checksum(&self) -> u8 {
        self.header_checksum
    }

    /// 帧头占用的字节数。
    pub fn header_len(&self) -> usize {
        self.len
    }
}

fn take<const N: usize>(rest: &mut &[u8]) -> Result<[u8; N], FrameError> {
    let (head, tail) = rest
        .split_first_chunk::<N>()
        .ok_or(FrameError::Truncated)?;
    *rest = tail;
    Ok(*head)
}

/// 按 `config` 编码 `len` 字节消息时的最坏帧长。
///
/// 覆盖最大帧头、每个块的长度字段与可选块校验、块数据的最坏压缩结果、帧尾标记以及可选的内容校验。
pub fn frame_bound(len: usize, config: &CompressionConfig) -> usize {
    let block = config.block_size.bytes();
    let per_block = BLOCK_SIZE_FIELD + if config.block_checksums { CHECKSUM_LEN } else { 0 };
    let full_blocks = len / block;
    let tail = len % block;

    let mut bound = MAX_HEADER_LEN + END_MARK_LEN;
    if config.content_checksum {
        bound += CHECKSUM_LEN;
    }
    let full = lz4_flex::block::get_maximum_output_size(block) + per_block;
    bound = bound.saturating_add(full_blocks.saturating_mul(full));
    if tail > 0 {
        bound = bound.saturating_add(lz4_flex::block::get_maximum_output_size(tail) + per_block);
    }
    bound
}

/// 接收 `len` 字节明文所需的最坏帧长，与对端使用的块大小及校验选项无关。
///
/// 最小块（64KiB）的块开销最大，因此以“64KiB 块 + 全部校验”组合估算。
pub fn receive_bound(len: usize) -> usize {
    let worst = CompressionConfig {
        block_size: FrameBlockSize::Max64KiB,
        block_checksums: true,
        content_checksum: true,
    };
    frame_bound(len, &worst)
}
