//! 追踪层契约测试：透明性与记录内容。
//!
//! 以记录型 `TraceSink` 捕获每条追踪记录，对比“裸管道”与“叠加追踪层”两种配置下的
//! 返回值、错误码与载荷，验证追踪层在数据与错误两个维度上都完全透明。

use std::{
    io::{IoSlice, IoSliceMut},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use proptest::prelude::*;
use spark_core::{
    Deadline, Handle, HandleId, MsockError, Registry, msock,
    test_stubs::{
        InertObject,
        memory::{self, Side},
    },
};
use spark_middleware::{
    Direction, LoggingConfig, LoggingSocket, TraceLevel, TraceRecord, TracingSink,
};
use tracing_test::traced_test;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Captured {
    handle: HandleId,
    direction: Direction,
    len: usize,
    bytes: Vec<u8>,
    line: String,
}

type Log = Arc<Mutex<Vec<Captured>>>;

fn recording_sink(log: &Log) -> impl FnMut(&TraceRecord<'_>) + Send + 'static {
    let log = Arc::clone(log);
    move |record: &TraceRecord<'_>| {
        log.lock().push(Captured {
            handle: record.handle(),
            direction: record.direction(),
            len: record.len(),
            bytes: record.chunks().concat(),
            line: record.render(),
        });
    }
}

fn registry() -> Registry {
    Registry::with_max_handles(32).expect("valid registry")
}

fn logged(handle: Handle, log: &Log) -> Handle {
    LoggingSocket::start_with_sink(handle, recording_sink(log)).expect("logging layer")
}

#[test]
fn send_is_traced_with_every_segment() {
    let registry = registry();
    let log = Log::default();
    let (left, mut right) = memory::pair(&registry).expect("pair");
    let mut left = logged(left, &log);
    let id = left.id();

    msock::send_vectored(
        &mut left,
        &[IoSlice::new(b"hel"), IoSlice::new(b""), IoSlice::new(b"lo")],
        Deadline::none(),
    )
    .expect("send");

    let mut buf = [0u8; 16];
    let len = msock::recv(&mut right, &mut buf, Deadline::none()).expect("bare recv");
    assert_eq!(&buf[..len], b"hello", "payload reaches the peer unchanged");

    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].handle, id);
    assert_eq!(log[0].direction, Direction::Send);
    assert_eq!(log[0].len, 5);
    assert_eq!(log[0].bytes, b"hello");
    assert_eq!(
        log[0].line,
        format!("handle: {:<4} send        5B: 0x68656c6c6f", id.get())
    );
}

#[test]
fn recv_trace_reports_received_bytes_not_capacity() {
    let registry = registry();
    let log = Log::default();
    let (mut left, right) = memory::pair(&registry).expect("pair");
    let mut right = logged(right, &log);

    msock::send(&mut left, b"abc", Deadline::none()).expect("send");
    let mut head = [0u8; 2];
    let mut tail = [0u8; 100];
    let len = msock::recv_vectored(
        &mut right,
        &mut [IoSliceMut::new(&mut head), IoSliceMut::new(&mut tail)],
        Deadline::none(),
    )
    .expect("recv");
    assert_eq!(len, 3);

    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].direction, Direction::Recv);
    assert_eq!(log[0].len, 3);
    assert_eq!(log[0].bytes, b"abc");
    assert!(log[0].line.ends_with("       3B: 0x616263"));
}

#[test]
fn failed_receive_emits_nothing_and_failed_send_is_still_traced() {
    let registry = registry();
    let log = Log::default();
    let (left, right) = memory::pair(&registry).expect("pair");
    let mut left = logged(left, &log);

    let mut buf = [0u8; 8];
    let err = msock::recv(
        &mut left,
        &mut buf,
        Deadline::after(Duration::from_millis(5)),
    )
    .expect_err("nothing to receive");
    assert!(matches!(err, MsockError::TimedOut));
    assert!(log.lock().is_empty());

    drop(right);
    let err = msock::send(&mut left, b"lost", Deadline::none()).expect_err("peer closed");
    assert!(matches!(err, MsockError::BrokenPipe));
    let log = log.lock();
    assert_eq!(log.len(), 1, "send trace precedes forwarding");
    assert_eq!(log[0].bytes, b"lost");
}

/// 在同一场景下分别驱动裸管道与追踪层，收集每一步的结果。
fn scenario(layered: bool) -> Vec<Result<usize, &'static str>> {
    let registry = registry();
    let log = Log::default();
    let (left, right) = memory::pair(&registry).expect("pair");
    let (mut left, mut right) = if layered {
        (logged(left, &log), logged(right, &log))
    } else {
        (left, right)
    };

    let mut outcomes = Vec::new();
    let mut small = [0u8; 2];
    let mut large = [0u8; 32];
    let code = |err: MsockError| err.code();

    outcomes.push(
        msock::send(&mut left, b"oversized", Deadline::none())
            .map(|()| 0)
            .map_err(code),
    );
    outcomes.push(msock::recv(&mut right, &mut small, Deadline::none()).map_err(code));
    outcomes.push(msock::recv(&mut right, &mut large, Deadline::none()).map_err(code));
    outcomes.push(
        msock::recv(
            &mut right,
            &mut large,
            Deadline::after(Duration::from_millis(5)),
        )
        .map_err(code),
    );
    drop(left);
    outcomes.push(msock::recv(&mut right, &mut large, Deadline::none()).map_err(code));
    outcomes.push(
        msock::send(&mut right, b"x", Deadline::none())
            .map(|()| 0)
            .map_err(code),
    );
    outcomes
}

#[test]
fn outcomes_match_the_bare_channel_exactly() {
    let bare = scenario(false);
    let layered = scenario(true);
    assert_eq!(bare, layered);
    assert_eq!(
        bare,
        vec![
            Ok(0),
            Err("spark.msock.message_too_large"),
            Ok(9),
            Err("spark.msock.timed_out"),
            Err("spark.msock.broken_pipe"),
            Err("spark.msock.broken_pipe"),
        ]
    );
}

#[test]
fn stop_hands_back_the_underlying_and_close_cascades() {
    let registry = registry();
    let log = Log::default();
    let (left, right, probe) = memory::pair_with_probe(&registry).expect("pair");
    let underlying_id = left.id();

    let layered = logged(left, &log);
    let left = LoggingSocket::stop(layered).expect("stop");
    assert_eq!(left.id(), underlying_id);
    assert_eq!(probe.closes(Side::Left), 0);

    let mut layered = logged(left, &log);
    assert_eq!(
        layered
            .instance_mut::<LoggingSocket>()
            .expect("logging layer")
            .underlying_id(),
        underlying_id
    );
    layered.close();
    assert_eq!(probe.closes(Side::Left), 1);
    assert_eq!(probe.releases(Side::Left), 1);
    drop(right);
    assert_eq!(registry.live_handles(), 0);
    assert!(log.lock().is_empty());
}

#[test]
fn start_on_inert_handle_is_rejected() {
    let registry = registry();
    let inert = registry
        .create(Box::new(InertObject::default()))
        .expect("create");
    let id = inert.id();
    let rejected = LoggingSocket::start(inert).expect_err("no message capability");
    let (error, handle) = rejected.into_parts();
    assert!(matches!(error, MsockError::NotSupported { .. }));
    assert_eq!(handle.id(), id);
    assert_eq!(registry.live_handles(), 1);
}

#[traced_test]
#[test]
fn tracing_sink_emits_one_event_per_record() {
    let registry = registry();
    let (left, mut right) = memory::pair(&registry).expect("pair");
    let mut left = LoggingSocket::start(left).expect("default sink");

    msock::send(&mut left, b"hello", Deadline::none()).expect("send");
    let mut buf = [0u8; 8];
    msock::recv(&mut right, &mut buf, Deadline::none()).expect("recv");

    assert!(logs_contain("send        5B: 0x68656c6c6f"));
    assert!(logs_contain("spark.middleware.logging"));
}

#[traced_test]
#[test]
fn tracing_sink_honours_the_configured_level() {
    let registry = registry();
    let (left, mut right) = memory::pair(&registry).expect("pair");
    let config = LoggingConfig {
        level: TraceLevel::Warn,
    };
    let mut left = LoggingSocket::start_with(left, config).expect("sink");
    assert_eq!(TracingSink::new(config.level).level(), TraceLevel::Warn);

    msock::send(&mut left, b"\x00\xff", Deadline::none()).expect("send");
    let mut buf = [0u8; 8];
    msock::recv(&mut right, &mut buf, Deadline::none()).expect("recv");

    assert!(logs_contain("WARN"));
    assert!(logs_contain("0x00ff"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn stacked_trace_layers_are_transparent(
        messages in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..512), 1..8),
    ) {
        let registry = registry();
        let log = Log::default();
        let (left, right) = memory::pair(&registry).expect("pair");
        let mut left = logged(logged(left, &log), &log);
        let mut right = logged(right, &log);

        for message in &messages {
            msock::send(&mut left, message, Deadline::none()).expect("send");
            let mut buf = vec![0u8; message.len() + 7];
            let len = msock::recv(&mut right, &mut buf, Deadline::none()).expect("recv");
            prop_assert_eq!(&buf[..len], &message[..]);
        }

        let log = log.lock();
        // 每条消息：两层发送记录 + 一层接收记录。
        prop_assert_eq!(log.len(), messages.len() * 3);
        for (index, message) in messages.iter().enumerate() {
            for entry in &log[index * 3..index * 3 + 3] {
                prop_assert_eq!(entry.len, message.len());
                prop_assert_eq!(&entry.bytes, message);
            }
        }
    }
}
