//! End-to-end command flow: client proxies on several threads, one listener
//! draining the queue, responses travelling back to clients.

use flashdriver::agent::{DriverAgent, DriverConfig};
use flashdriver::client::{read_error_responses, DriverProxy, ResponseChannel};
use flashdriver::conductor::DriverConductor;
use flashdriver::errors::{CommandResult, DistinctErrorLog, SystemCounters};
use flashdriver::protocol::ErrorCode;
use flashdriver::queue::{ManyToOneRingBuffer, QueueError, RingBufferConsumer};
use flashdriver::{ClientListener, MESSAGE_COUNT_LIMIT};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Records `(client_id, stream_id)` of every network publication.
#[derive(Default)]
struct OrderRecorder {
    publications: Vec<(i64, i32)>,
    keepalives: usize,
}

impl DriverConductor for OrderRecorder {
    fn on_add_ipc_publication(&mut self, _: String, _: i32, _: i64, _: i64) -> CommandResult {
        Ok(())
    }

    fn on_add_network_publication(&mut self, _: String, stream_id: i32, _: i64, client_id: i64) -> CommandResult {
        self.publications.push((client_id, stream_id));
        Ok(())
    }

    fn on_remove_publication(&mut self, _: i64, _: i64) -> CommandResult {
        Ok(())
    }

    fn on_add_ipc_subscription(&mut self, _: String, _: i32, _: i64, _: i64) -> CommandResult {
        Ok(())
    }

    fn on_add_spy_subscription(&mut self, _: String, _: i32, _: i64, _: i64) -> CommandResult {
        Ok(())
    }

    fn on_add_network_subscription(&mut self, _: String, _: i32, _: i64, _: i64) -> CommandResult {
        Ok(())
    }

    fn on_remove_subscription(&mut self, _: i64, _: i64) -> CommandResult {
        Ok(())
    }

    fn on_add_destination(&mut self, _: i64, _: String, _: i64) -> CommandResult {
        Ok(())
    }

    fn on_remove_destination(&mut self, _: i64, _: String, _: i64) -> CommandResult {
        Ok(())
    }

    fn on_client_keepalive(&mut self, _: i64) -> CommandResult {
        self.keepalives += 1;
        Ok(())
    }
}

struct IgnoreResponses;

impl ResponseChannel for IgnoreResponses {
    fn on_error(&mut self, _: ErrorCode, _: &str, _: i64) {}
}

fn create_listener(ring: &Arc<ManyToOneRingBuffer>) -> ClientListener<OrderRecorder, IgnoreResponses> {
    ClientListener::new(
        RingBufferConsumer::claim(Arc::clone(ring)).unwrap(),
        OrderRecorder::default(),
        IgnoreResponses,
        SystemCounters::new(),
        DistinctErrorLog::shared(16),
    )
}

#[test]
fn test_concurrent_producers_keep_per_client_order() {
    const PRODUCERS: i64 = 4;
    const PER_PRODUCER: i32 = 2_000;

    // Small enough to wrap many times and to push back on producers
    let ring = Arc::new(ManyToOneRingBuffer::new(4096).unwrap());
    let mut listener = create_listener(&ring);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|client_id| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut proxy = DriverProxy::new(ring, client_id);
                for sequence in 0..PER_PRODUCER {
                    loop {
                        match proxy.add_publication("aeron:udp?endpoint=localhost:40123", sequence) {
                            Ok(_) => break,
                            Err(QueueError::InsufficientCapacity) => thread::yield_now(),
                            Err(e) => panic!("unexpected queue error: {}", e),
                        }
                    }
                }
            })
        })
        .collect();

    let total = (PRODUCERS as usize) * (PER_PRODUCER as usize);
    let mut received = 0;
    while received < total {
        let count = listener.receive();
        assert!(count <= MESSAGE_COUNT_LIMIT);
        received += count;
        if count == 0 {
            thread::yield_now();
        }
    }

    for producer in producers {
        producer.join().unwrap();
    }

    let mut next_expected: HashMap<i64, i32> = HashMap::new();
    for &(client_id, stream_id) in &listener.conductor().publications {
        let expected = next_expected.entry(client_id).or_insert(0);
        assert_eq!(stream_id, *expected, "client {} out of order", client_id);
        *expected += 1;
    }

    assert_eq!(listener.conductor().publications.len(), total);
    for client_id in 0..PRODUCERS {
        assert_eq!(next_expected[&client_id], PER_PRODUCER);
    }
    assert_eq!(listener.counters().errors.get(), 0);
}

#[test]
fn test_receive_drains_in_batches_of_ten() {
    let ring = Arc::new(ManyToOneRingBuffer::new(64 * 1024).unwrap());
    let mut listener = create_listener(&ring);
    let mut proxy = DriverProxy::new(Arc::clone(&ring), 1);

    for sequence in 0..35 {
        proxy.add_publication("aeron:udp?endpoint=x:1", sequence).unwrap();
    }

    let batches: Vec<usize> = (0..5).map(|_| listener.receive()).collect();
    assert_eq!(batches, vec![10, 10, 10, 5, 0]);

    let streams: Vec<i32> = listener
        .conductor()
        .publications
        .iter()
        .map(|&(_, stream_id)| stream_id)
        .collect();
    assert_eq!(streams, (0..35).collect::<Vec<_>>());
}

#[test]
fn test_keepalives_produce_no_responses() {
    let config = DriverConfig {
        command_queue_capacity: 4096,
        response_buffer_capacity: 4096,
        ..Default::default()
    };
    let mut agent = DriverAgent::new(&config).unwrap();
    let mut responses = RingBufferConsumer::claim(Arc::clone(agent.to_clients())).unwrap();
    let mut proxy = DriverProxy::new(Arc::clone(agent.to_driver()), 5);

    proxy.add_subscription("aeron:ipc", 1).unwrap();
    for _ in 0..5 {
        tokio_test::assert_ok!(proxy.send_keepalive());
    }

    while agent.do_work(0) > 0 {}

    assert!(read_error_responses(&mut responses, 100).is_empty());
    assert_eq!(agent.counters().commands_received.get(), 6);
    assert_eq!(agent.counters().errors.get(), 0);
}

#[test]
fn test_bad_commands_do_not_stall_good_ones() {
    let config = DriverConfig {
        command_queue_capacity: 4096,
        response_buffer_capacity: 4096,
        client_liveness_timeout: Duration::from_secs(60),
        ..Default::default()
    };
    let mut agent = DriverAgent::new(&config).unwrap();
    let mut responses = RingBufferConsumer::claim(Arc::clone(agent.to_clients())).unwrap();
    let mut proxy = DriverProxy::new(Arc::clone(agent.to_driver()), 5);

    let good_before = proxy.add_publication("aeron:ipc", 1).unwrap();
    let bad_channel = proxy.add_subscription("tcp://example", 7).unwrap();
    let unknown = proxy.remove_subscription(999).unwrap();
    // Not a command type the driver knows
    agent.to_driver().write(0x33, &[0u8; 4]).unwrap();
    let good_after = proxy.add_subscription("aeron-spy:aeron:udp?endpoint=x:1", 2).unwrap();

    while agent.do_work(0) > 0 {}

    let errors = read_error_responses(&mut responses, 100);
    let codes: Vec<(i64, ErrorCode)> = errors.iter().map(|e| (e.correlation_id, e.code)).collect();
    assert_eq!(
        codes,
        vec![
            (bad_channel, ErrorCode::InvalidChannel),
            (unknown, ErrorCode::UnknownSubscription),
        ]
    );

    let conductor = agent.conductor();
    assert!(conductor.publication(good_before).is_some());
    let spy = conductor.subscription(good_after).unwrap();
    assert_eq!(spy.channel, "aeron:udp?endpoint=x:1");

    assert_eq!(agent.counters().errors.get(), 2);
    assert_eq!(agent.counters().unknown_commands.get(), 1);
    assert_eq!(agent.error_log().lock().unwrap().distinct_count(), 2);
}
