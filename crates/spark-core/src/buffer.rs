//! 只增不减的层私有缓冲。
//!
//! # 设计初衷（Why）
//! - 压缩层的发送/接收缓冲按“迄今最大消息的最坏帧长”定容，消息尺寸稳定后不再发生分配；
//! - 把扩容策略集中到一个类型里，使“容量单调不减、只在需要更大帧时扩容”成为可测试的显式契约。
//!
//! # 契约定义（What）
//! - [`GrowBuffer::reserve`]：容量不足时精确扩容到所需大小，并累计一次扩容计数；容量充足时什么也不做；
//! - 扩容失败以 [`MsockError::AllocationFailed`] 返回，容量、内容与扩容计数都保持原样；
//! - [`GrowBuffer::clear`] 与 [`GrowBuffer::window_mut`] 均不会缩容；
//! - 缓冲由层对象独占，随层对象一同释放。

use crate::error::{MsockError, Result};

/// 只增不减的字节缓冲。
#[derive(Debug, Default)]
pub struct GrowBuffer {
    bytes: Vec<u8>,
    reallocations: usize,
}

impl GrowBuffer {
    /// 创建空缓冲（不分配）。
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            reallocations: 0,
        }
    }

    /// 当前容量。
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// 已发生的扩容次数。
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }

    /// 确保容量至少为 `required`，返回本次是否扩容。
    pub fn reserve(&mut self, required: usize) -> Result<bool> {
        if self.bytes.capacity() >= required {
            return Ok(false);
        }
        self.bytes
            .try_reserve_exact(required - self.bytes.len())
            .map_err(|cause| MsockError::AllocationFailed {
                requested: required,
                cause,
            })?;
        self.reallocations += 1;
        Ok(true)
    }

    /// 清空内容，保留容量。
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// 以 `Vec` 形式借出，供 `io::Write` 风格的编码器追加写入。
    pub fn as_vec_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }

    /// 已写入的内容。
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// 借出前 `len` 字节的可写窗口，必要时扩容并零填充新增部分。
    ///
    /// 窗口之外的已初始化字节保持不变，不会缩减长度。
    pub fn window_mut(&mut self, len: usize) -> Result<&mut [u8]> {
        self.reserve(len)?;
        if self.bytes.len() < len {
            self.bytes.resize(len, 0);
        }
        Ok(&mut self.bytes[..len])
    }

    /// 读取前 `len` 字节；`len` 不得超过已初始化长度。
    pub fn window(&self, len: usize) -> &[u8] {
        &self.bytes[..len]
    }
}
