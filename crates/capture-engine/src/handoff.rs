//! Single-slot frame rendezvous between the render thread and the
//! encoding worker.
//!
//! Exactly two [`YuvFrame`] buffers circulate. The producer acquires the
//! buffer whose slot matches the parity of the next frame index, fills it,
//! and sends it; the consumer receives it and returns it when its guard is
//! dropped. The producer may fill a buffer only once:
//! - the previous frame has been taken by the consumer (the ready slot is
//!   empty), and
//! - the consumer has released that buffer from the cycle before.
//!
//! So the producer can convert frame `n + 1` while the encoder still works
//! on frame `n`, but never writes a buffer the encoder is reading.
//!
//! Both halves hand buffers out as guards ([`AcquiredFrame`],
//! [`ReceivedFrame`]); dropping a guard returns its buffer to the pool.
//!
//! Closing is cooperative: the running flag is cleared and both sides are
//! woken. A blocked receiver returns `None` instead of a frame; a frame
//! that was sent but not yet taken is discarded and counted.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use screenmux_common::error::{ScreenmuxError, ScreenmuxResult};

use crate::frame::YuvFrame;

struct Slots {
    ready: Option<YuvFrame>,
    free: [Option<YuvFrame>; 2],
    running: bool,
    /// Sent frames dropped by `close` before the consumer took them.
    discarded: u64,
}

struct Shared {
    slots: Mutex<Slots>,
    /// Signaled when a frame becomes ready, or on close.
    ready: Condvar,
    /// Signaled when the consumer takes or releases a frame, or on close.
    consuming: Condvar,
}

impl Shared {
    fn close(&self) {
        let mut slots = self.slots.lock();
        if !slots.running {
            return;
        }
        slots.running = false;
        if let Some(frame) = slots.ready.take() {
            tracing::debug!(index = frame.index(), "Discarding unconsumed frame on close");
            let slot = frame.slot();
            slots.free[slot] = Some(frame);
            slots.discarded += 1;
        }
        drop(slots);
        self.ready.notify_all();
        self.consuming.notify_all();
    }

    fn is_open(&self) -> bool {
        self.slots.lock().running
    }

    fn release(&self, frame: YuvFrame) {
        let slot = frame.slot();
        self.slots.lock().free[slot] = Some(frame);
        self.consuming.notify_one();
    }
}

/// Build a channel around the two frame buffers of a pipeline.
///
/// The frames must carry slots 0 and 1.
pub fn frame_handoff(frames: [YuvFrame; 2]) -> ScreenmuxResult<(FrameSender, FrameReceiver)> {
    let mut free: [Option<YuvFrame>; 2] = [None, None];
    for frame in frames {
        let slot = frame.slot();
        if slot > 1 || free[slot].is_some() {
            return Err(ScreenmuxError::pipeline(format!(
                "Frame buffers must use slots 0 and 1, got duplicate or invalid slot {slot}"
            )));
        }
        free[slot] = Some(frame);
    }

    let shared = Arc::new(Shared {
        slots: Mutex::new(Slots {
            ready: None,
            free,
            running: true,
            discarded: 0,
        }),
        ready: Condvar::new(),
        consuming: Condvar::new(),
    });
    Ok((
        FrameSender {
            shared: shared.clone(),
        },
        FrameReceiver { shared },
    ))
}

/// Producer half, owned by the render thread.
pub struct FrameSender {
    shared: Arc<Shared>,
}

impl FrameSender {
    /// Take the buffer for frame `index`, waiting until the consumer has
    /// taken the previous frame and released this buffer.
    ///
    /// Fails with [`ScreenmuxError::Stopped`] once the channel is closed.
    pub fn acquire(&mut self, index: u64) -> ScreenmuxResult<AcquiredFrame> {
        let slot = (index % 2) as usize;
        let mut slots = self.shared.slots.lock();
        loop {
            if !slots.running {
                return Err(ScreenmuxError::Stopped);
            }
            if slots.ready.is_none() {
                if let Some(mut frame) = slots.free[slot].take() {
                    frame.set_index(index);
                    return Ok(AcquiredFrame {
                        frame: Some(frame),
                        shared: self.shared.clone(),
                    });
                }
            }
            self.shared.consuming.wait(&mut slots);
        }
    }

    /// Publish a filled buffer to the consumer.
    ///
    /// The buffer goes back to the free pool if the channel has closed.
    pub fn send(&mut self, mut frame: AcquiredFrame) -> ScreenmuxResult<()> {
        let Some(frame) = frame.frame.take() else {
            return Err(ScreenmuxError::pipeline("Acquired frame was already released"));
        };
        let mut slots = self.shared.slots.lock();
        if !slots.running {
            let slot = frame.slot();
            slots.free[slot] = Some(frame);
            return Err(ScreenmuxError::Stopped);
        }
        if slots.ready.is_some() {
            // acquire() only hands out a buffer while the ready slot is empty.
            let slot = frame.slot();
            slots.free[slot] = Some(frame);
            return Err(ScreenmuxError::pipeline(
                "A frame is already waiting for the encoder",
            ));
        }
        slots.ready = Some(frame);
        drop(slots);
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Return an acquired buffer without publishing it. Same as dropping
    /// the guard.
    pub fn cancel(&mut self, frame: AcquiredFrame) {
        drop(frame);
    }

    /// Sent frames that `close` discarded before the consumer took them.
    pub fn discarded(&self) -> u64 {
        self.shared.slots.lock().discarded
    }

    /// Clear the running flag and wake both sides.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }
}

/// Consumer half, owned by the encoding worker.
pub struct FrameReceiver {
    shared: Arc<Shared>,
}

impl FrameReceiver {
    /// Block until a frame is ready, or return `None` once the channel is
    /// closed.
    pub fn recv(&mut self) -> Option<ReceivedFrame> {
        let mut slots = self.shared.slots.lock();
        loop {
            if !slots.running {
                return None;
            }
            if let Some(frame) = slots.ready.take() {
                drop(slots);
                // The producer may start on the other buffer now.
                self.shared.consuming.notify_one();
                return Some(ReceivedFrame {
                    frame: Some(frame),
                    shared: self.shared.clone(),
                });
            }
            self.shared.ready.wait(&mut slots);
        }
    }

    /// Clear the running flag and wake both sides.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }
}

/// A frame owned by the consumer. Dropping it releases the buffer back to
/// the producer.
pub struct ReceivedFrame {
    frame: Option<YuvFrame>,
    shared: Arc<Shared>,
}

impl Deref for ReceivedFrame {
    type Target = YuvFrame;

    fn deref(&self) -> &YuvFrame {
        match &self.frame {
            Some(frame) => frame,
            None => unreachable!("frame is only taken on drop"),
        }
    }
}

impl Drop for ReceivedFrame {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.shared.release(frame);
        }
    }
}

/// A buffer the producer is filling. Dropping it without sending returns
/// the buffer to its slot.
pub struct AcquiredFrame {
    frame: Option<YuvFrame>,
    shared: Arc<Shared>,
}

impl Deref for AcquiredFrame {
    type Target = YuvFrame;

    fn deref(&self) -> &YuvFrame {
        match &self.frame {
            Some(frame) => frame,
            None => unreachable!("frame is only taken by send or drop"),
        }
    }
}

impl DerefMut for AcquiredFrame {
    fn deref_mut(&mut self) -> &mut YuvFrame {
        match &mut self.frame {
            Some(frame) => frame,
            None => unreachable!("frame is only taken by send or drop"),
        }
    }
}

impl Drop for AcquiredFrame {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.shared.release(frame);
        }
    }
}
