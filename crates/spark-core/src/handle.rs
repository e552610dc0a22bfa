//! 句柄注册表与句柄所有权模型。
//!
//! # 教案式概览
//! - **意图（Why）**：为每个存活的层对象分配一个小整数身份（[`HandleId`]），用于日志标签与诊断；
//!   同时以有界容量模拟“资源耗尽”路径，保证构造失败时能够完整回滚；
//! - **结构（How）**：[`Registry`] 以 `parking_lot::Mutex` 保护的空闲表管理 id；[`HandleSlot`] 代表一个已预留的 id，
//!   在 `Drop` 时归还；[`Handle`] 将槽位与 `Box<dyn Closable>` 绑定，独占所有权、不可克隆；
//! - **契约（What）**：
//!   - 句柄释放恰好一次：显式 [`Handle::close`] 或离开作用域二选一，由所有权保证；
//!   - 分层构造先 [`Registry::reserve`] 再构造对象，失败时底层句柄经由 [`Rejected`] 原样归还调用方；
//! - **风险提示（Trade-offs）**：注册表只记录 id 的占用情况，不持有对象本身；
//!   对象由句柄直接拥有，因此嵌套调用无需回到注册表查表。

use std::{
    any::Any,
    fmt,
    sync::{Arc, OnceLock},
};

use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    capability::{Capability, CapabilityMarker, CapabilityToken, Closable},
    config::RegistryConfig,
    error::{MsockError, Result},
};

/// 注册表内的句柄编号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u32);

impl HandleId {
    /// 以原始编号构造。
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// 原始编号。
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Default)]
struct SlotTable {
    free: Vec<u32>,
    next: u32,
    live: usize,
}

#[derive(Debug)]
struct RegistryInner {
    config: RegistryConfig,
    slots: Mutex<SlotTable>,
}

/// 有界句柄注册表。
///
/// 克隆开销为一次 `Arc` 引用计数递增；同一注册表的所有克隆共享 id 空间。
#[derive(Clone, Debug)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// 基于配置构造注册表。
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RegistryInner {
                config,
                slots: Mutex::new(SlotTable::default()),
            }),
        })
    }

    /// 以指定容量构造注册表。
    pub fn with_max_handles(max_handles: usize) -> Result<Self> {
        Self::new(RegistryConfig { max_handles })
    }

    /// 进程级默认注册表，首次访问时按默认配置创建。
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(|| Registry {
            inner: Arc::new(RegistryInner {
                config: RegistryConfig::default(),
                slots: Mutex::new(SlotTable::default()),
            }),
        })
    }

    /// 预留一个句柄槽位；容量已满时返回 [`MsockError::ResourceExhausted`]。
    pub fn reserve(&self) -> Result<HandleSlot> {
        let limit = self.inner.config.max_handles;
        let mut slots = self.inner.slots.lock();
        if slots.live >= limit {
            tracing::warn!(target: "spark.core.handle", limit, "handle registry exhausted");
            return Err(MsockError::ResourceExhausted { limit });
        }
        let raw = match slots.free.pop() {
            Some(raw) => raw,
            None => {
                let raw = slots.next;
                slots.next += 1;
                raw
            }
        };
        slots.live += 1;
        Ok(HandleSlot {
            id: HandleId(raw),
            registry: self.clone(),
        })
    }

    /// 为终端对象创建句柄；若预留失败，对象随之释放。
    pub fn create(&self, object: Box<dyn Closable>) -> Result<Handle> {
        let slot = self.reserve()?;
        Ok(Handle::from_parts(slot, object))
    }

    /// 当前存活的句柄数量。
    pub fn live_handles(&self) -> usize {
        self.inner.slots.lock().live
    }

    /// 容量上限。
    pub fn max_handles(&self) -> usize {
        self.inner.config.max_handles
    }

    fn release(&self, id: HandleId) {
        let mut slots = self.inner.slots.lock();
        slots.live -= 1;
        // 优先复用最小的编号，与文件描述符的分配习惯保持一致。
        slots.free.push(id.0);
        slots.free.sort_unstable_by(|a, b| b.cmp(a));
    }
}

/// 已预留的句柄编号，`Drop` 时归还注册表。
pub struct HandleSlot {
    id: HandleId,
    registry: Registry,
}

impl HandleSlot {
    /// 预留到的编号；层可在对象构造前取得自身 id（例如作为日志标签）。
    pub fn id(&self) -> HandleId {
        self.id
    }
}

impl Drop for HandleSlot {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

impl fmt::Debug for HandleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandleSlot").field(&self.id).finish()
    }
}

/// 独占的句柄：注册表槽位 + 句柄对象。
pub struct Handle {
    slot: HandleSlot,
    object: Box<dyn Closable>,
}

impl Handle {
    /// 将预留的槽位与对象绑定为句柄。
    pub fn from_parts(slot: HandleSlot, object: Box<dyn Closable>) -> Self {
        Self { slot, object }
    }

    /// 句柄编号。
    pub fn id(&self) -> HandleId {
        self.slot.id
    }

    /// 句柄所属注册表；层在构造时从底层句柄继承注册表。
    pub fn registry(&self) -> &Registry {
        &self.slot.registry
    }

    /// 按令牌查询能力，不支持时返回 `None`。
    pub fn query(&mut self, token: CapabilityToken) -> Option<Capability<'_>> {
        self.object.query(token)
    }

    /// 是否支持给定能力。
    pub fn supports(&mut self, token: CapabilityToken) -> bool {
        self.query(token).is_some()
    }

    /// 以具体层类型的令牌查询，并向下转型为该类型。
    pub fn instance_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Closable + CapabilityMarker,
    {
        match self.query(T::token()) {
            Some(Capability::Instance(any)) => any.downcast_mut::<T>(),
            _ => None,
        }
    }

    /// 取回具体对象并释放本句柄的槽位；类型不符时原样返回句柄。
    ///
    /// 对象本身不会被关闭，供 `stop` 拆除包装层使用。
    pub fn downcast<T: Closable>(self) -> core::result::Result<Box<T>, Handle> {
        let probe: &dyn Any = &*self.object;
        if !probe.is::<T>() {
            return Err(self);
        }
        let Handle { slot, object } = self;
        drop(slot);
        let object: Box<dyn Any> = object;
        match object.downcast::<T>() {
            Ok(concrete) => Ok(concrete),
            Err(_) => unreachable!("handle object type verified before downcast"),
        }
    }

    /// 关闭句柄：执行对象自身的拆除（级联关闭底层句柄），随后归还槽位。
    pub fn close(self) {
        let Handle { slot, object } = self;
        tracing::debug!(target: "spark.core.handle", handle = slot.id.get(), "closing handle");
        object.close();
        drop(slot);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("id", &self.slot.id).finish()
    }
}

/// 被拒绝的 `start`/`stop`：携带失败原因，并把调用方的句柄原样交还。
///
/// 拒绝路径上不会关闭任何句柄；调用方可改用其他层，或自行关闭。
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejected {
    #[source]
    error: MsockError,
    handle: Handle,
}

impl Rejected {
    /// 构造拒绝结果。
    pub fn new(error: MsockError, handle: Handle) -> Self {
        Self { error, handle }
    }

    /// 失败原因。
    pub fn error(&self) -> &MsockError {
        &self.error
    }

    /// 取回句柄。
    pub fn into_handle(self) -> Handle {
        self.handle
    }

    /// 拆分为原因与句柄。
    pub fn into_parts(self) -> (MsockError, Handle) {
        (self.error, self.handle)
    }
}
