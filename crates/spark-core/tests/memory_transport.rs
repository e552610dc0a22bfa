//! 内存管道终端传输的契约测试。
//!
//! 覆盖消息边界、截止时间、对端关闭、超长消息保留以及关闭计数，
//! 这些性质是上层压缩/日志层契约测试的前提。

use std::{
    io::{IoSlice, IoSliceMut},
    thread,
    time::{Duration, Instant},
};

use proptest::prelude::*;
use spark_core::{
    CapabilityMarker, Deadline, ErrorCategory, MessageSocketCapability, MsockError, Registry,
    msock,
    test_stubs::memory::{self, MemoryEnd, Side},
};

fn registry() -> Registry {
    Registry::with_max_handles(16).expect("valid registry")
}

#[test]
fn messages_keep_their_boundaries_and_order() {
    let registry = registry();
    let (mut left, mut right) = memory::pair(&registry).expect("pair");

    msock::send(&mut left, b"first", Deadline::none()).expect("send");
    msock::send_vectored(
        &mut left,
        &[IoSlice::new(b"sec"), IoSlice::new(b"ond")],
        Deadline::none(),
    )
    .expect("send");

    let mut buf = [0u8; 32];
    let len = msock::recv(&mut right, &mut buf, Deadline::none()).expect("recv");
    assert_eq!(&buf[..len], b"first");

    let mut a = [0u8; 2];
    let mut b = [0u8; 10];
    let len = msock::recv_vectored(
        &mut right,
        &mut [IoSliceMut::new(&mut a), IoSliceMut::new(&mut b)],
        Deadline::none(),
    )
    .expect("recv");
    assert_eq!(len, 6);
    assert_eq!(&a, b"se");
    assert_eq!(&b[..4], b"cond");
}

#[test]
fn empty_queue_with_expired_deadline_times_out() {
    let registry = registry();
    let (_left, mut right) = memory::pair(&registry).expect("pair");
    let mut buf = [0u8; 4];
    let started = Instant::now();
    let err = msock::recv(
        &mut right,
        &mut buf,
        Deadline::after(Duration::from_millis(20)),
    )
    .expect_err("nothing to receive");
    assert!(matches!(err, MsockError::TimedOut));
    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(20));
}

#[test]
fn oversize_message_stays_queued_for_a_larger_retry() {
    let registry = registry();
    let (mut left, mut right, probe) = memory::pair_with_probe(&registry).expect("pair");
    msock::send(&mut left, b"0123456789", Deadline::none()).expect("send");

    let mut small = [0u8; 4];
    let err = msock::recv(&mut right, &mut small, Deadline::none()).expect_err("too small");
    assert!(matches!(
        err,
        MsockError::MessageTooLarge {
            required: 10,
            capacity: 4
        }
    ));
    assert_eq!(probe.pending(Side::Right), 1);

    let mut large = [0u8; 10];
    assert_eq!(
        msock::recv(&mut right, &mut large, Deadline::none()).expect("retry"),
        10
    );
    assert_eq!(&large, b"0123456789");
    assert_eq!(probe.pending(Side::Right), 0);
}

#[test]
fn closed_peer_breaks_the_pipe_after_draining() {
    let registry = registry();
    let (mut left, mut right, probe) = memory::pair_with_probe(&registry).expect("pair");
    msock::send(&mut left, b"last words", Deadline::none()).expect("send");
    left.close();
    assert!(!probe.is_open(Side::Left));

    let mut buf = [0u8; 16];
    let len = msock::recv(&mut right, &mut buf, Deadline::none()).expect("queued message");
    assert_eq!(&buf[..len], b"last words");
    let err = msock::recv(&mut right, &mut buf, Deadline::none()).expect_err("peer gone");
    assert!(matches!(err, MsockError::BrokenPipe));
    let err = msock::send(&mut right, b"hello?", Deadline::none()).expect_err("peer gone");
    assert_eq!(err.category(), ErrorCategory::Closed);
}

#[test]
fn close_and_drop_are_counted_separately() {
    let registry = registry();
    let (left, right, probe) = memory::pair_with_probe(&registry).expect("pair");
    assert_eq!(registry.live_handles(), 2);

    left.close();
    assert_eq!(probe.closes(Side::Left), 1);
    assert_eq!(probe.releases(Side::Left), 1);

    drop(right);
    assert_eq!(probe.closes(Side::Right), 0);
    assert_eq!(probe.releases(Side::Right), 1);
    assert_eq!(registry.live_handles(), 0);
}

#[test]
fn pair_on_nearly_full_registry_rolls_back() {
    let registry = Registry::with_max_handles(1).expect("valid registry");
    let err = memory::pair(&registry).expect_err("needs two slots");
    assert!(matches!(err, MsockError::ResourceExhausted { limit: 1 }));
    assert_eq!(registry.live_handles(), 0);
}

#[test]
fn blocked_receiver_wakes_when_a_message_arrives() {
    let registry = registry();
    let (mut left, mut right, probe) = memory::pair_with_probe(&registry).expect("pair");

    let receiver = thread::spawn(move || {
        let mut buf = [0u8; 8];
        let len = msock::recv(
            &mut right,
            &mut buf,
            Deadline::after(Duration::from_secs(10)),
        )
        .expect("message arrives before the deadline");
        buf[..len].to_vec()
    });

    thread::sleep(Duration::from_millis(20));
    msock::send(&mut left, b"wake", Deadline::none()).expect("send");
    let received = receiver.join().expect("receiver thread");
    assert_eq!(received, b"wake");
    assert_eq!(probe.received(Side::Right), 1);
}

#[test]
fn endpoint_exposes_its_instance() {
    let registry = registry();
    let (mut left, _right) = memory::pair(&registry).expect("pair");
    assert!(left.supports(MessageSocketCapability::token()));
    assert!(left.supports(MemoryEnd::token()));
    let end = left.instance_mut::<MemoryEnd>().expect("instance");
    assert_eq!(end.side(), Side::Left);
}

proptest! {
    #[test]
    fn any_segmentation_delivers_the_concatenation(
        chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..6),
        split in 0usize..256,
    ) {
        let registry = registry();
        let (mut left, mut right) = memory::pair(&registry).expect("pair");
        let slices: Vec<IoSlice<'_>> = chunks.iter().map(|chunk| IoSlice::new(chunk)).collect();
        msock::send_vectored(&mut left, &slices, Deadline::none()).expect("send");

        let message: Vec<u8> = chunks.concat();
        let split = split.min(message.len());
        let mut head = vec![0u8; split];
        let mut tail = vec![0u8; message.len() - split];
        let len = msock::recv_vectored(
            &mut right,
            &mut [IoSliceMut::new(&mut head), IoSliceMut::new(&mut tail)],
            Deadline::none(),
        )
        .expect("recv");
        prop_assert_eq!(len, message.len());
        prop_assert_eq!([head, tail].concat(), message);
    }
}
