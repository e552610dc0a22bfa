//! 终端传输与空能力对象的测试桩集合。
//!
//! # 设计定位（Why）
//! - 分层实现（压缩、日志）的契约测试需要一个真实可收发的底层消息通道，以及一个“不支持任何能力”的句柄；
//! - 集中维护可避免各 crate 重复定义桩对象，并在契约调整时获得集中编译错误提示。
//!
//! # 契约说明（What）
//! - [`memory`]：进程内消息管道，遵守截止时间，记录关闭/释放次数；
//! - [`InertObject`]：能力查询恒返回 `None`，关闭时只累计计数。
//!
//! # 风险与权衡（Trade-offs）
//! - 桩对象面向测试与示例，生产代码若依赖应显式说明原因。

pub mod memory;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::capability::{Capability, CapabilityToken, Closable};

/// 不支持任何能力的句柄对象。
#[derive(Debug, Default)]
pub struct InertObject {
    closes: Arc<AtomicUsize>,
}

impl InertObject {
    /// 共享关闭计数器的实例，便于在句柄被消费后继续断言。
    pub fn with_counter(closes: Arc<AtomicUsize>) -> Self {
        Self { closes }
    }
}

impl Closable for InertObject {
    fn query(&mut self, _token: CapabilityToken) -> Option<Capability<'_>> {
        None
    }

    fn close(self: Box<Self>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
