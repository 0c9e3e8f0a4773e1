use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use whisper_tts::stream::{
    ChunkStore, Consumer, FeederPhase, FeederSignal, IncrementalMediaFeeder, MockSink, SinkEvent,
    SinkOp,
};

/// One random schedule of chunk arrivals, sink completions and the open
/// handshake. Returns the sizes of the chunks in arrival order.
fn run_schedule(seed: u64) -> (Vec<usize>, whisper_tts::stream::MockSinkHandle, FeederPhase) {
    let mut rng = StdRng::seed_from_u64(seed);
    let sink = MockSink::new(1);
    let handle = sink.handle();
    let mut feeder = IncrementalMediaFeeder::new(Box::new(sink));
    let mut store = ChunkStore::new();
    assert_eq!(feeder.open(), FeederSignal::Idle);

    let total = rng.gen_range(1..40);
    let mut sizes = Vec::with_capacity(total);
    let mut opened = false;
    let mut finalized = false;

    loop {
        let can_add = sizes.len() < total;
        let can_complete = handle.in_flight();
        if !can_add && !can_complete && opened && finalized {
            break;
        }

        match rng.gen_range(0..4) {
            0 if !opened => {
                opened = true;
                let signal = feeder.handle_event(&SinkEvent::Opened { sink: 1 }, &mut store);
                assert_eq!(signal, FeederSignal::Ready);
            }
            1 if can_add => {
                let size = rng.gen_range(1..64);
                store.append(vec![0u8; size]).unwrap();
                sizes.push(size);
                assert_eq!(feeder.on_chunk_added(&mut store), FeederSignal::Idle);
            }
            2 if can_complete => {
                handle.finish_append();
                let signal = feeder.handle_event(&SinkEvent::UpdateEnd { sink: 1 }, &mut store);
                assert_eq!(signal, FeederSignal::Idle);
            }
            3 if !can_add && !finalized => {
                finalized = true;
                store.finalize();
                assert_eq!(feeder.finalize(&mut store), FeederSignal::Idle);
            }
            _ => {}
        }

        assert_eq!(
            handle.overlapping_appends(),
            0,
            "seed {} overlapped appends",
            seed
        );
        assert_eq!(feeder.is_busy(), handle.in_flight(), "seed {}", seed);
    }

    assert!(store.is_drained(Consumer::Sink));
    (sizes, handle, feeder.phase())
}

#[test]
fn random_interleavings_never_overlap_appends() {
    for seed in 0..300 {
        let (sizes, handle, phase) = run_schedule(seed);

        let appended: Vec<usize> = handle
            .ops()
            .iter()
            .filter_map(|op| match op {
                SinkOp::Append(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(appended, sizes, "seed {} pushed out of order", seed);
        assert_eq!(handle.overlapping_appends(), 0, "seed {}", seed);
        assert!(handle.ended(), "seed {} never closed the stream", seed);
        assert_eq!(phase, FeederPhase::Ended, "seed {}", seed);
    }
}

#[test]
fn end_of_stream_comes_after_last_append() {
    for seed in 0..100 {
        let (_, handle, _) = run_schedule(seed);
        let ops = handle.ops();
        let end = ops.iter().position(|op| *op == SinkOp::EndOfStream).unwrap();
        assert_eq!(end, ops.len() - 1, "seed {}: {:?}", seed, ops);
        assert_eq!(ops.first(), Some(&SinkOp::Open));
    }
}

#[test]
fn chunks_before_handshake_are_flushed_on_open() {
    let sink = MockSink::new(3);
    let handle = sink.handle();
    let mut feeder = IncrementalMediaFeeder::new(Box::new(sink));
    let mut store = ChunkStore::new();
    feeder.open();

    for size in [5, 6, 7] {
        store.append(vec![1u8; size]).unwrap();
        feeder.on_chunk_added(&mut store);
    }
    assert_eq!(handle.append_count(), 0);

    feeder.handle_event(&SinkEvent::Opened { sink: 3 }, &mut store);
    assert_eq!(handle.append_count(), 1);
    for _ in 0..2 {
        handle.finish_append();
        feeder.handle_event(&SinkEvent::UpdateEnd { sink: 3 }, &mut store);
    }
    assert_eq!(
        handle.ops(),
        vec![
            SinkOp::Open,
            SinkOp::Append(5),
            SinkOp::Append(6),
            SinkOp::Append(7)
        ]
    );
    assert_eq!(feeder.pushed(), 3);
}

#[test]
fn events_for_other_sinks_are_ignored() {
    let sink = MockSink::new(1);
    let handle = sink.handle();
    let mut feeder = IncrementalMediaFeeder::new(Box::new(sink));
    let mut store = ChunkStore::new();
    feeder.open();

    assert_eq!(
        feeder.handle_event(&SinkEvent::Opened { sink: 2 }, &mut store),
        FeederSignal::Idle
    );
    assert_eq!(feeder.phase(), FeederPhase::Opening);
    store.append(vec![1u8; 4]).unwrap();
    feeder.on_chunk_added(&mut store);
    assert_eq!(handle.append_count(), 0);
}
