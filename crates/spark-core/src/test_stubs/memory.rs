//! 进程内消息管道：分层栈最底层的终端传输。
//!
//! # 行为描述（How）
//! - [`pair`] 返回两个互联端点，每个方向各有一条无界消息队列；发送从不阻塞；
//! - 接收在队列为空时阻塞于条件变量，直至消息到达、对端关闭或截止时间到期；
//! - 队首消息超过接收容量时返回 [`MsockError::MessageTooLarge`]，消息保留在队列中，调用方可用更大容量重试；
//! - [`MemoryProbe`] 记录每一端的显式关闭次数与最终释放次数，用于验证级联关闭“恰好一次”。

use std::{
    collections::VecDeque,
    io::{IoSlice, IoSliceMut},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use parking_lot::{Condvar, Mutex};

use crate::{
    capability::{Capability, CapabilityMarker, CapabilityToken, Closable},
    contract::Deadline,
    error::{MsockError, Result},
    handle::{Handle, Registry},
    msock::{self, MessageSocket, MessageSocketCapability},
};

/// 管道的一端。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    fn peer(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Default)]
struct SideCounters {
    closes: AtomicUsize,
    releases: AtomicUsize,
    sent: AtomicUsize,
    received: AtomicUsize,
}

#[derive(Debug)]
struct PipeState {
    // inbound[i]：发往第 i 端、尚未被接收的消息。
    inbound: [VecDeque<Vec<u8>>; 2],
    open: [bool; 2],
}

#[derive(Debug)]
struct Pipe {
    state: Mutex<PipeState>,
    ready: Condvar,
    counters: [SideCounters; 2],
}

/// 管道端点对象。
#[derive(Debug)]
pub struct MemoryEnd {
    pipe: Arc<Pipe>,
    side: Side,
}

impl CapabilityMarker for MemoryEnd {
    const NAME: &'static str = "spark.test_stubs.memory";
}

impl MemoryEnd {
    /// 端点所在的一侧。
    pub fn side(&self) -> Side {
        self.side
    }

    fn counters(&self) -> &SideCounters {
        &self.pipe.counters[self.side.index()]
    }
}

impl Closable for MemoryEnd {
    fn query(&mut self, token: CapabilityToken) -> Option<Capability<'_>> {
        if token == MessageSocketCapability::token() {
            return Some(Capability::MessageSocket(self));
        }
        if token == Self::token() {
            return Some(Capability::Instance(self));
        }
        None
    }

    fn close(self: Box<Self>) {
        self.counters().closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MemoryEnd {
    fn drop(&mut self) {
        self.pipe.state.lock().open[self.side.index()] = false;
        self.counters().releases.fetch_add(1, Ordering::SeqCst);
        self.pipe.ready.notify_all();
    }
}

impl MessageSocket for MemoryEnd {
    fn send_vectored(&mut self, segments: &[IoSlice<'_>], _deadline: Deadline) -> Result<()> {
        let peer = self.side.peer().index();
        let mut message = Vec::new();
        msock::gather(segments, &mut message);
        let mut state = self.pipe.state.lock();
        if !state.open[peer] {
            return Err(MsockError::BrokenPipe);
        }
        state.inbound[peer].push_back(message);
        drop(state);
        self.counters().sent.fetch_add(1, Ordering::SeqCst);
        self.pipe.ready.notify_all();
        Ok(())
    }

    fn recv_vectored(
        &mut self,
        segments: &mut [IoSliceMut<'_>],
        deadline: Deadline,
    ) -> Result<usize> {
        let me = self.side.index();
        let peer = self.side.peer().index();
        let capacity = msock::total_len_mut(segments);
        let mut state = self.pipe.state.lock();
        loop {
            let front_len = state.inbound[me].front().map(Vec::len);
            if let Some(required) = front_len {
                if required > capacity {
                    return Err(MsockError::MessageTooLarge {
                        required: required as u64,
                        capacity,
                    });
                }
                let message = state.inbound[me].pop_front().unwrap_or_default();
                drop(state);
                let len = msock::scatter(segments, &message);
                self.counters().received.fetch_add(1, Ordering::SeqCst);
                return Ok(len);
            }
            if !state.open[peer] {
                return Err(MsockError::BrokenPipe);
            }
            match deadline.instant() {
                None => self.pipe.ready.wait(&mut state),
                Some(at) => {
                    if Instant::now() >= at {
                        return Err(MsockError::TimedOut);
                    }
                    self.pipe.ready.wait_until(&mut state, at);
                }
            }
        }
    }
}

/// 管道观测探针。
#[derive(Clone, Debug)]
pub struct MemoryProbe {
    pipe: Arc<Pipe>,
}

impl MemoryProbe {
    /// 该端被显式 `close` 的次数。
    pub fn closes(&self, side: Side) -> usize {
        self.pipe.counters[side.index()].closes.load(Ordering::SeqCst)
    }

    /// 该端对象被释放的次数（显式关闭或离开作用域）。
    pub fn releases(&self, side: Side) -> usize {
        self.pipe.counters[side.index()].releases.load(Ordering::SeqCst)
    }

    /// 该端成功发送的消息数。
    pub fn sent(&self, side: Side) -> usize {
        self.pipe.counters[side.index()].sent.load(Ordering::SeqCst)
    }

    /// 该端成功接收的消息数。
    pub fn received(&self, side: Side) -> usize {
        self.pipe.counters[side.index()].received.load(Ordering::SeqCst)
    }

    /// 发往该端、尚未被接收的消息数。
    pub fn pending(&self, side: Side) -> usize {
        self.pipe.state.lock().inbound[side.index()].len()
    }

    /// 该端是否仍存活。
    pub fn is_open(&self, side: Side) -> bool {
        self.pipe.state.lock().open[side.index()]
    }
}

/// 在 `registry` 中创建一对互联端点，返回 `(left, right)`。
pub fn pair(registry: &Registry) -> Result<(Handle, Handle)> {
    let (left, right, _probe) = pair_with_probe(registry)?;
    Ok((left, right))
}

/// 创建互联端点并附带观测探针。
pub fn pair_with_probe(registry: &Registry) -> Result<(Handle, Handle, MemoryProbe)> {
    let left_slot = registry.reserve()?;
    let right_slot = registry.reserve()?;
    let pipe = Arc::new(Pipe {
        state: Mutex::new(PipeState {
            inbound: [VecDeque::new(), VecDeque::new()],
            open: [true, true],
        }),
        ready: Condvar::new(),
        counters: [SideCounters::default(), SideCounters::default()],
    });
    let left = MemoryEnd {
        pipe: Arc::clone(&pipe),
        side: Side::Left,
    };
    let right = MemoryEnd {
        pipe: Arc::clone(&pipe),
        side: Side::Right,
    };
    Ok((
        Handle::from_parts(left_slot, Box::new(left)),
        Handle::from_parts(right_slot, Box::new(right)),
        MemoryProbe { pipe },
    ))
}
