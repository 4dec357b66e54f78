//! Single-producer, single-consumer audio sample ring.
//!
//! The platform audio callback owns the [`AudioInput`] half and only
//! pushes; the render thread owns the [`RingReader`] half and only pops.
//! Neither side takes a lock. Each cursor is written by exactly one side,
//! and the cursor store is the last step of every operation, so the other
//! side never observes a cursor ahead of the data behind it.
//!
//! When a push moves the write cursor onto the read cursor the buffer has
//! wrapped over unread audio. That is an overrun: counted, logged, and
//! otherwise ignored. The ring then reads as empty and recording goes on.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use screenmux_common::error::{ScreenmuxError, ScreenmuxResult};

use crate::pipeline::StageTimer;

/// Divisor applied to signed 16-bit PCM on the way in.
const PCM_SCALE: f32 = 32769.0;

/// Result of a single push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Stored,
    /// The write cursor caught up with the read cursor.
    Overrun,
}

struct Shared {
    samples: Box<[AtomicU32]>,
    write: AtomicUsize,
    read: AtomicUsize,
    overruns: AtomicU64,
    callbacks: AtomicU64,
    callback_ns: AtomicU64,
    callback_max_ns: AtomicU64,
}

impl Shared {
    fn capacity(&self) -> usize {
        self.samples.len()
    }

    fn available(&self) -> usize {
        let cap = self.capacity();
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        (cap + write - read) % cap
    }
}

/// Create a ring holding `capacity` samples.
///
/// At most `capacity - 1` samples can be buffered before an overrun.
pub fn audio_ring(capacity: usize) -> ScreenmuxResult<(AudioInput, RingReader)> {
    if capacity < 2 {
        return Err(ScreenmuxError::config(format!(
            "Audio ring capacity must be at least 2 samples, got {capacity}"
        )));
    }
    let samples = (0..capacity)
        .map(|_| AtomicU32::new(0))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let shared = Arc::new(Shared {
        samples,
        write: AtomicUsize::new(0),
        read: AtomicUsize::new(0),
        overruns: AtomicU64::new(0),
        callbacks: AtomicU64::new(0),
        callback_ns: AtomicU64::new(0),
        callback_max_ns: AtomicU64::new(0),
    });
    Ok((
        AudioInput {
            shared: shared.clone(),
        },
        RingReader { shared },
    ))
}

/// Producer half, handed to the audio capture callback.
pub struct AudioInput {
    shared: Arc<Shared>,
}

impl AudioInput {
    /// Append one sample. Never blocks.
    pub fn push(&mut self, sample: f32) -> Push {
        let shared = &*self.shared;
        let write = shared.write.load(Ordering::Relaxed);
        shared.samples[write].store(sample.to_bits(), Ordering::Relaxed);
        let next = (write + 1) % shared.capacity();
        shared.write.store(next, Ordering::Release);

        if next == shared.read.load(Ordering::Acquire) {
            shared.overruns.fetch_add(1, Ordering::Relaxed);
            Push::Overrun
        } else {
            Push::Stored
        }
    }

    /// Convert one block of captured signed 16-bit PCM and push it.
    ///
    /// Returns the number of overruns the block caused.
    pub fn push_block(&mut self, pcm: &[i16]) -> usize {
        let start = Instant::now();
        let mut overruns = 0;
        for &sample in pcm {
            if self.push(sample as f32 / PCM_SCALE) == Push::Overrun {
                overruns += 1;
            }
        }
        if overruns > 0 {
            tracing::warn!(
                overruns,
                block = pcm.len(),
                "Audio ring buffer overrun; unread samples were overwritten"
            );
        }

        let ns = start.elapsed().as_nanos() as u64;
        let shared = &*self.shared;
        shared.callbacks.fetch_add(1, Ordering::Relaxed);
        shared.callback_ns.fetch_add(ns, Ordering::Relaxed);
        shared.callback_max_ns.fetch_max(ns, Ordering::Relaxed);
        overruns
    }

    pub fn available(&self) -> usize {
        self.shared.available()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn write_cursor(&self) -> usize {
        self.shared.write.load(Ordering::Acquire)
    }

    pub fn read_cursor(&self) -> usize {
        self.shared.read.load(Ordering::Acquire)
    }

    /// Total overruns since the ring was created.
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }
}

/// Consumer half, drained by the audio frame assembler.
pub struct RingReader {
    shared: Arc<Shared>,
}

impl RingReader {
    /// Take the oldest unread sample, or `None` when the ring is empty.
    pub fn pop(&mut self) -> Option<f32> {
        let shared = &*self.shared;
        let read = shared.read.load(Ordering::Relaxed);
        if read == shared.write.load(Ordering::Acquire) {
            return None;
        }
        let sample = f32::from_bits(shared.samples[read].load(Ordering::Relaxed));
        shared
            .read
            .store((read + 1) % shared.capacity(), Ordering::Release);
        Some(sample)
    }

    /// Number of unread samples.
    pub fn available(&self) -> usize {
        self.shared.available()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn read_cursor(&self) -> usize {
        self.shared.read.load(Ordering::Acquire)
    }

    pub fn write_cursor(&self) -> usize {
        self.shared.write.load(Ordering::Acquire)
    }

    /// Total overruns since the ring was created.
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }

    /// Time the capture callback has spent in [`AudioInput::push_block`].
    pub fn callback_timing(&self) -> StageTimer {
        let shared = &*self.shared;
        StageTimer {
            count: shared.callbacks.load(Ordering::Relaxed),
            total_ns: shared.callback_ns.load(Ordering::Relaxed),
            max_ns: shared.callback_max_ns.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_tiny_capacity() {
        assert!(audio_ring(1).is_err());
        assert!(audio_ring(2).is_ok());
    }

    #[test]
    fn test_push_pop_fifo() {
        let (mut input, mut reader) = audio_ring(8).unwrap();
        assert_eq!(reader.pop(), None);
        for i in 0..5 {
            assert_eq!(input.push(i as f32), Push::Stored);
        }
        assert_eq!(reader.available(), 5);
        for i in 0..5 {
            assert_eq!(reader.pop(), Some(i as f32));
        }
        assert_eq!(reader.available(), 0);
        assert_eq!(reader.pop(), None);
    }

    #[test]
    fn test_cursors_wrap_modulo_capacity() {
        let (mut input, mut reader) = audio_ring(4).unwrap();
        for round in 0..10 {
            input.push(round as f32);
            input.push(round as f32 + 0.5);
            assert_eq!(reader.pop(), Some(round as f32));
            assert_eq!(reader.pop(), Some(round as f32 + 0.5));
        }
        assert_eq!(reader.write_cursor(), 20 % 4);
        assert_eq!(reader.read_cursor(), 20 % 4);
        assert_eq!(reader.overruns(), 0);
    }

    #[test]
    fn test_overrun_when_write_reaches_read() {
        let (mut input, reader) = audio_ring(4).unwrap();
        assert_eq!(input.push(0.1), Push::Stored);
        assert_eq!(input.push(0.2), Push::Stored);
        assert_eq!(input.push(0.3), Push::Stored);
        assert_eq!(reader.available(), 3);
        assert_eq!(input.push(0.4), Push::Overrun);
        assert_eq!(reader.available(), 0);
        assert_eq!(input.overruns(), 1);

        // Recording continues after the loss.
        assert_eq!(input.push(0.5), Push::Stored);
        assert_eq!(reader.available(), 1);
    }

    #[test]
    fn test_push_block_scales_pcm() {
        let (mut input, mut reader) = audio_ring(16).unwrap();
        let overruns = input.push_block(&[0, 32767, -32768, 16384]);
        assert_eq!(overruns, 0);
        assert_eq!(reader.pop(), Some(0.0));
        assert_eq!(reader.pop(), Some(32767.0 / 32769.0));
        assert_eq!(reader.pop(), Some(-32768.0 / 32769.0));
        assert_eq!(reader.pop(), Some(16384.0 / 32769.0));
        assert_eq!(reader.callback_timing().count, 1);
    }

    #[test]
    fn test_push_block_counts_overruns() {
        let (mut input, reader) = audio_ring(4).unwrap();
        // Each time the write cursor lands on 0 it meets the read cursor.
        let overruns = input.push_block(&[1; 9]);
        assert_eq!(overruns, 2);
        assert_eq!(reader.overruns(), 2);
        assert_eq!(reader.available(), 1);
    }

    #[test]
    fn test_concurrent_producer_and_consumer_preserve_order() {
        let (mut input, mut reader) = audio_ring(1024).unwrap();
        let total = 50_000usize;
        let producer = std::thread::spawn(move || {
            let mut i = 0;
            while i < total {
                // Stay below capacity so nothing is overwritten.
                if input.available() < 1000 {
                    input.push(i as f32);
                    i += 1;
                } else {
                    std::thread::yield_now();
                }
            }
            input.overruns()
        });

        let mut expected = 0usize;
        while expected < total {
            match reader.pop() {
                Some(sample) => {
                    assert_eq!(sample, expected as f32);
                    expected += 1;
                }
                None => std::thread::yield_now(),
            }
        }
        assert_eq!(producer.join().unwrap(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(usize),
        Pop(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![(1usize..40).prop_map(Op::Push), (1usize..40).prop_map(Op::Pop)]
    }

    proptest! {
        #[test]
        fn prop_available_tracks_unread(capacity in 2usize..64, ops in prop::collection::vec(op(), 1..60)) {
            let (mut input, mut reader) = audio_ring(capacity).unwrap();
            let mut unread = 0usize;
            for op in ops {
                match op {
                    Op::Push(n) => {
                        // Stay within the no-loss regime.
                        let n = n.min(capacity - 1 - unread);
                        for _ in 0..n {
                            prop_assert_eq!(input.push(0.25), Push::Stored);
                            unread += 1;
                        }
                    }
                    Op::Pop(n) => {
                        for _ in 0..n {
                            match reader.pop() {
                                Some(_) => unread -= 1,
                                None => prop_assert_eq!(unread, 0),
                            }
                        }
                    }
                }
                prop_assert_eq!(reader.available(), unread);
            }
        }

        #[test]
        fn prop_overrun_iff_write_meets_read(capacity in 2usize..32, pushes in 1usize..200, pops in prop::collection::vec(0usize..4, 1..200)) {
            let (mut input, mut reader) = audio_ring(capacity).unwrap();
            for (i, pop_count) in pops.iter().enumerate().take(pushes) {
                let before = reader.overruns();
                let outcome = input.push(i as f32);
                let met = reader.write_cursor() == reader.read_cursor();
                prop_assert_eq!(outcome == Push::Overrun, met);
                prop_assert_eq!(reader.overruns() - before, u64::from(met));
                prop_assert!(reader.available() < capacity);
                for _ in 0..*pop_count {
                    reader.pop();
                }
            }
        }
    }
}
