//! Ping-pong protocol tests: state machine, ordering, accounting, and the
//! end-to-end under-supply / overrun / crash-restart scenarios.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use duofft::notify::{DoorbellConfig, Mailbox, Notifier, NotifyError};
use duofft::pingpong::{BufferManager, Clock, StdClock};
use duofft::region::OwnedRegion;
use duofft::{BufferState, IpcError};

/// Deterministic single-threaded clock: every poll pause advances 1 ms.
#[derive(Clone)]
struct SimClock {
    now: Rc<Cell<u64>>,
}

impl SimClock {
    fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
        }
    }

    fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn pause(&self) {
        self.now.set(self.now.get() + 1);
    }
}

/// Mailbox double that counts rings per channel.
#[derive(Clone, Default)]
struct TestMailbox {
    sent_to_consumer: Arc<AtomicU32>,
    sent_to_producer: Arc<AtomicU32>,
}

const CH_TO_CONSUMER: u32 = 20;
const CH_TO_PRODUCER: u32 = 21;

impl Mailbox for TestMailbox {
    fn enable(&self, _channel: u32) -> Result<(), NotifyError> {
        Ok(())
    }
    fn send(&self, channel: u32) -> Result<(), NotifyError> {
        match channel {
            CH_TO_CONSUMER => self.sent_to_consumer.fetch_add(1, Ordering::SeqCst),
            CH_TO_PRODUCER => self.sent_to_producer.fetch_add(1, Ordering::SeqCst),
            _ => return Err(NotifyError::ChannelUnavailable),
        };
        Ok(())
    }
    fn register_callback(&self, _channel: u32, _callback: fn()) -> Result<(), NotifyError> {
        Ok(())
    }
}

fn producer_notifier(mbox: TestMailbox) -> Notifier<TestMailbox> {
    Notifier::new(
        mbox,
        DoorbellConfig {
            tx_channel: CH_TO_CONSUMER,
            rx_channel: CH_TO_PRODUCER,
        },
    )
}

fn consumer_notifier(mbox: TestMailbox) -> Notifier<TestMailbox> {
    Notifier::new(
        mbox,
        DoorbellConfig {
            tx_channel: CH_TO_PRODUCER,
            rx_channel: CH_TO_CONSUMER,
        },
    )
}

/// Both sides' managers over one fresh 4 KiB-buffer region.
fn setup(
    clock: &SimClock,
) -> (
    OwnedRegion,
    BufferManager<SimClock, TestMailbox>,
    BufferManager<SimClock, TestMailbox>,
    TestMailbox,
) {
    let owned = OwnedRegion::new(4096);
    let region = owned.region();
    let mbox = TestMailbox::default();
    let mut consumer =
        BufferManager::new(region, clock.clone(), consumer_notifier(mbox.clone()));
    consumer.initialize(100).unwrap();
    let producer = BufferManager::new(region, clock.clone(), producer_notifier(mbox.clone()));
    producer.attach().unwrap();
    (owned, producer, consumer, mbox)
}

#[test]
fn attach_requires_initialized_consumer() {
    let owned = OwnedRegion::new(4096);
    let clock = SimClock::new();
    let mbox = TestMailbox::default();
    let producer = BufferManager::new(owned.region(), clock, producer_notifier(mbox));
    assert_eq!(producer.attach(), Err(IpcError::NotReady));
}

#[test]
fn initialize_is_idempotent() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, _mbox) = setup(&clock);

    let h = producer.acquire_for_write(0).unwrap();
    producer.commit(h).unwrap();

    consumer.initialize(100).unwrap();
    let first = consumer.stats();
    consumer.initialize(100).unwrap();
    assert_eq!(consumer.stats(), first);
    assert_eq!(consumer.state(0).unwrap(), BufferState::Idle);
    assert_eq!(consumer.state(1).unwrap(), BufferState::Idle);
    assert_eq!(first.total_writes(), 0);
}

#[test]
fn state_rejects_bad_id() {
    let clock = SimClock::new();
    let (_owned, producer, _consumer, _mbox) = setup(&clock);
    assert_eq!(producer.state(2), Err(IpcError::Invalid));
}

#[test]
fn round_robin_alternates_when_both_idle() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, _mbox) = setup(&clock);

    let mut ids = Vec::new();
    for _ in 0..6 {
        let h = producer.acquire_for_write(0).unwrap();
        ids.push(h.id());
        producer.commit(h).unwrap();
        let r = consumer.acquire_for_read(0).unwrap();
        consumer.release(r).unwrap();
    }
    assert_eq!(ids, vec![0, 1, 0, 1, 0, 1]);
}

#[test]
fn commit_transitions_and_rings_consumer() {
    let clock = SimClock::new();
    let (_owned, mut producer, _consumer, mbox) = setup(&clock);

    let h = producer.acquire_for_write(0).unwrap();
    assert_eq!(producer.state(h.id()).unwrap(), BufferState::Writing);
    let id = h.id();
    producer.commit(h).unwrap();
    assert_eq!(producer.state(id).unwrap(), BufferState::Ready);
    assert_eq!(mbox.sent_to_consumer.load(Ordering::SeqCst), 1);
    assert_eq!(producer.stats().writes[id as usize], 1);
}

#[test]
fn release_transitions_and_rings_producer() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, mbox) = setup(&clock);

    let h = producer.acquire_for_write(0).unwrap();
    producer.commit(h).unwrap();
    let r = consumer.acquire_for_read(0).unwrap();
    assert_eq!(consumer.state(r.id()).unwrap(), BufferState::Reading);
    let id = r.id();
    consumer.release(r).unwrap();
    assert_eq!(consumer.state(id).unwrap(), BufferState::Idle);
    assert_eq!(mbox.sent_to_producer.load(Ordering::SeqCst), 1);
    assert_eq!(consumer.stats().reads[id as usize], 1);
}

#[test]
fn commit_after_reset_is_wrong_state() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, _mbox) = setup(&clock);

    let h = producer.acquire_for_write(0).unwrap();
    // Consumer restarts underneath the producer: the WRITING claim is gone.
    consumer.initialize(100).unwrap();
    assert_eq!(producer.commit(h), Err(IpcError::WrongState));
    // Counters were not touched by the failed commit.
    assert_eq!(producer.stats().total_writes(), 0);
}

#[test]
fn release_after_reset_is_wrong_state() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, _mbox) = setup(&clock);

    let h = producer.acquire_for_write(0).unwrap();
    producer.commit(h).unwrap();
    let r = consumer.acquire_for_read(0).unwrap();
    consumer.initialize(100).unwrap();
    assert_eq!(consumer.release(r), Err(IpcError::WrongState));
    assert_eq!(consumer.stats().total_reads(), 0);
}

#[test]
fn fifo_consumption_by_commit_timestamp() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, _mbox) = setup(&clock);

    let h0 = producer.acquire_for_write(0).unwrap();
    producer.commit(h0).unwrap();
    clock.advance(5);
    let h1 = producer.acquire_for_write(0).unwrap();
    producer.commit(h1).unwrap();

    let r = consumer.acquire_for_read(0).unwrap();
    assert_eq!(r.id(), 0, "older commit must be drained first");
    consumer.release(r).unwrap();
    let r = consumer.acquire_for_read(0).unwrap();
    assert_eq!(r.id(), 1);
    consumer.release(r).unwrap();
}

#[test]
fn fifo_tie_breaks_by_ascending_id() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, _mbox) = setup(&clock);

    // Same timestamp on both commits (clock never advances in between).
    let h0 = producer.acquire_for_write(0).unwrap();
    producer.commit(h0).unwrap();
    let h1 = producer.acquire_for_write(0).unwrap();
    producer.commit(h1).unwrap();

    let r = consumer.acquire_for_read(0).unwrap();
    assert_eq!(r.id(), 0);
    consumer.release(r).unwrap();
}

#[test]
fn overrun_counts_at_most_once_per_acquire() {
    let clock = SimClock::new();
    let (_owned, mut producer, _consumer, _mbox) = setup(&clock);

    let h = producer.acquire_for_write(0).unwrap();
    producer.commit(h).unwrap();
    let h = producer.acquire_for_write(0).unwrap();
    producer.commit(h).unwrap();

    // Both buffers READY: many poll iterations, exactly one overrun.
    let err = producer.acquire_for_write(50).unwrap_err();
    assert_eq!(err, IpcError::Timeout);
    let stats = producer.stats();
    assert_eq!(stats.overruns, 1);
    assert_eq!(stats.timeouts, 1);

    // A second starved call counts a second overrun.
    assert!(producer.acquire_for_write(10).is_err());
    assert_eq!(producer.stats().overruns, 2);
}

#[test]
fn nonblocking_read_times_out_cleanly() {
    let clock = SimClock::new();
    let (_owned, _producer, mut consumer, _mbox) = setup(&clock);

    assert!(consumer.acquire_for_read(0).is_err());
    assert_eq!(consumer.stats().timeouts, 1);
    // Nothing was disturbed.
    assert_eq!(consumer.state(0).unwrap(), BufferState::Idle);
    assert_eq!(consumer.state(1).unwrap(), BufferState::Idle);
}

#[test]
fn counters_never_regress() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, _mbox) = setup(&clock);

    let mut last_writes = 0;
    let mut last_reads = 0;
    for _ in 0..50 {
        let h = producer.acquire_for_write(0).unwrap();
        producer.commit(h).unwrap();
        let r = consumer.acquire_for_read(0).unwrap();
        consumer.release(r).unwrap();

        let stats = consumer.stats();
        assert!(stats.total_writes() >= last_writes);
        assert!(stats.total_reads() >= last_reads);
        last_writes = stats.total_writes();
        last_reads = stats.total_reads();
    }
    assert_eq!(last_writes, 50);
    assert_eq!(last_reads, 50);
}

/// E1: under-supplied consumer keeps up; no overruns, perfect alternation.
#[test]
fn e1_pingpong_under_supply() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, _mbox) = setup(&clock);

    let mut ids = Vec::new();
    for cycle in 0..1000u32 {
        let mut h = producer.acquire_for_write(1000).unwrap();
        ids.push(h.id());
        h.as_mut_slice()[0] = cycle as u8;
        producer.commit(h).unwrap();
        clock.advance(10);

        let r = consumer.acquire_for_read(0).unwrap();
        assert_eq!(r.as_slice()[0], cycle as u8);
        consumer.release(r).unwrap();
        clock.advance(2);
    }

    let stats = consumer.stats();
    assert_eq!(stats.total_writes(), 1000);
    assert_eq!(stats.total_reads(), 1000);
    assert_eq!(stats.overruns, 0);
    assert_eq!(stats.in_flight(), 0);
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(*id as usize, i % 2, "cycle {}", i);
    }
}

/// E2: producer outruns a slow consumer; overrun counted, then timeout.
#[test]
fn e2_pingpong_overrun() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, _mbox) = setup(&clock);

    let h = producer.acquire_for_write(0).unwrap();
    producer.commit(h).unwrap();
    clock.advance(1);
    let h = producer.acquire_for_write(0).unwrap();
    producer.commit(h).unwrap();
    clock.advance(1);

    // Third acquire: both buffers non-IDLE.
    assert_ne!(producer.state(0).unwrap(), BufferState::Idle);
    assert_ne!(producer.state(1).unwrap(), BufferState::Idle);
    let err = producer.acquire_for_write(20).unwrap_err();
    assert_eq!(err, IpcError::Timeout);
    let stats = producer.stats();
    assert!(stats.overruns >= 1);
    assert_eq!(stats.timeouts, 1);

    // The slow consumer eventually drains both; progress resumes.
    let r = consumer.acquire_for_read(0).unwrap();
    clock.advance(10);
    consumer.release(r).unwrap();
    let r = consumer.acquire_for_read(0).unwrap();
    clock.advance(10);
    consumer.release(r).unwrap();
    assert!(producer.acquire_for_write(0).is_ok());
}

/// E3: consumer misses a doorbell; a later poll restores progress and no
/// buffer is stranded outside IDLE.
#[test]
fn e3_missed_doorbell_recovers() {
    let clock = SimClock::new();
    let (_owned, mut producer, mut consumer, _mbox) = setup(&clock);

    for cycle in 0..100u32 {
        let mut h = producer.acquire_for_write(0).unwrap();
        h.as_mut_slice()[0] = cycle as u8;
        producer.commit(h).unwrap();
        let r = consumer.acquire_for_read(0).unwrap();
        consumer.release(r).unwrap();
    }
    let before = consumer.stats();

    // Producer commits, but the doorbell is "lost": the consumer simply
    // does not run. State stays READY; nothing corrupts.
    let h = producer.acquire_for_write(0).unwrap();
    producer.commit(h).unwrap();

    // Consumer polls on its own schedule and finds the buffer.
    let r = consumer.acquire_for_read(0).unwrap();
    consumer.release(r).unwrap();

    let after = consumer.stats();
    assert_eq!(after.total_writes(), before.total_writes() + 1);
    assert_eq!(after.total_reads(), before.total_reads() + 1);
    assert!(after.overruns >= before.overruns);
    assert_eq!(consumer.state(0).unwrap(), BufferState::Idle);
    assert_eq!(consumer.state(1).unwrap(), BufferState::Idle);
}

/// Two real threads over one region: every committed pattern arrives
/// intact and in order.
#[test]
fn threaded_producer_consumer_stress() {
    const CYCLES: u32 = 300;
    let owned = OwnedRegion::new(4096);
    let region = owned.region();
    let mbox = TestMailbox::default();

    let mut consumer =
        BufferManager::new(region, StdClock::new(), consumer_notifier(mbox.clone()));
    consumer.initialize(100).unwrap();
    let mut producer =
        BufferManager::new(region, StdClock::new(), producer_notifier(mbox.clone()));
    producer.attach().unwrap();

    std::thread::scope(|scope| {
        scope.spawn(move || {
            for cycle in 0..CYCLES {
                let mut h = producer.acquire_for_write(5000).expect("producer starved");
                let body = h.as_mut_slice();
                let stamp = cycle.to_le_bytes();
                body[..4].copy_from_slice(&stamp);
                body[4] = stamp.iter().fold(0u8, |a, b| a.wrapping_add(*b));
                producer.commit(h).unwrap();
            }
        });

        scope.spawn(move || {
            // Exactly-once delivery with intact bodies. Commit timestamps
            // can tie at millisecond resolution and ties resolve by buffer
            // id, so this stress run does not assert global ordering —
            // the deterministic FIFO tests above cover that.
            let mut seen = vec![false; CYCLES as usize];
            for n in 0..CYCLES {
                let r = match consumer.acquire_for_read(5000) {
                    Ok(r) => r,
                    Err(e) => panic!("consumer starved at {}: {:?}", n, e),
                };
                let body = r.as_slice();
                let cycle = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
                let check = body[0]
                    .wrapping_add(body[1])
                    .wrapping_add(body[2])
                    .wrapping_add(body[3]);
                assert_eq!(body[4], check, "frame {} corrupted", cycle);
                assert!(!seen[cycle as usize], "frame {} delivered twice", cycle);
                seen[cycle as usize] = true;
                consumer.release(r).unwrap();
            }
            assert!(seen.iter().all(|s| *s));
            let stats = consumer.stats();
            assert_eq!(stats.total_reads(), CYCLES);
            assert_eq!(stats.total_writes(), CYCLES);
        });
    });
}
