//! 能力令牌与句柄对象契约。
//!
//! # 教案式概览
//! - **意图（Why）**：让任意层对象都能被统一地当作“句柄”，并按需被当作“消息套接字”或其具体层类型使用，
//!   同时无需中心化的类型注册表；
//! - **结构（How）**：每种能力由一个标记类型代表，[`CapabilityToken`] 取其 [`TypeId`] 作为进程内唯一身份；
//!   句柄对象实现 [`Closable`]，在 `query` 中以身份比较判定是否支持某能力，并返回对应视图；
//! - **契约（What）**：未知令牌一律返回 `None`，绝不 panic；不同能力必须使用不同的标记类型；
//! - **风险提示（Trade-offs）**：令牌只在同一进程内稳定，不可序列化或跨进程比较。

use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
};

use crate::msock::MessageSocket;

/// 能力标记类型。
///
/// 实现者通常是层的具体类型本身（用于 `stop` 与状态查询），或一个不可实例化的空枚举（用于通用能力）。
pub trait CapabilityMarker: 'static {
    /// 诊断用名称，出现在错误信息与日志中。
    const NAME: &'static str;

    /// 返回该标记对应的唯一令牌。
    fn token() -> CapabilityToken
    where
        Self: Sized,
    {
        CapabilityToken::of::<Self>()
    }
}

/// 进程内唯一的能力身份。
///
/// 相等性只比较标记类型身份；`name` 仅用于诊断。
#[derive(Clone, Copy)]
pub struct CapabilityToken {
    id: TypeId,
    name: &'static str,
}

impl CapabilityToken {
    /// 取标记类型 `M` 的令牌。
    pub fn of<M: CapabilityMarker>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: M::NAME,
        }
    }

    /// 诊断名称。
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for CapabilityToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CapabilityToken {}

impl Hash for CapabilityToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapabilityToken").field(&self.name).finish()
    }
}

/// 一次成功查询返回的能力视图。
pub enum Capability<'a> {
    /// 通用消息套接字视图。
    MessageSocket(&'a mut dyn MessageSocket),
    /// 具体层实例，可向下转型为实现类型以读取其私有状态。
    Instance(&'a mut (dyn Any + 'static)),
}

impl fmt::Debug for Capability<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageSocket(_) => f.write_str("Capability::MessageSocket"),
            Self::Instance(_) => f.write_str("Capability::Instance"),
        }
    }
}

/// 句柄对象契约：能力查询与拆除。
///
/// # 契约说明（What）
/// - `query`：O(1) 身份比较；不支持的令牌返回 `None`；
/// - `close`：释放层私有状态，并关闭其独占的底层句柄（恰好一次）。以 `Box<Self>` 接收，
///   因此同一对象不可能被关闭两次；
/// - `Any` 超 trait 允许 [`Handle::downcast`](crate::Handle::downcast) 在 `stop` 时取回具体类型。
pub trait Closable: Any + Send {
    /// 按令牌查询能力。
    fn query(&mut self, token: CapabilityToken) -> Option<Capability<'_>>;

    /// 执行对象自身的拆除逻辑。
    fn close(self: Box<Self>);
}
