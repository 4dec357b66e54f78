use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use screenmux_capture_engine::{frame_handoff, YuvFrame};

const FRAMES: u64 = 2_000;

fn frames(width: usize, height: usize) -> [YuvFrame; 2] {
    [YuvFrame::new(width, height, 0), YuvFrame::new(width, height, 1)]
}

#[test]
fn consumer_never_sees_a_torn_or_skipped_frame() {
    let (mut tx, mut rx) = frame_handoff(frames(64, 48)).unwrap();

    let consumer = thread::spawn(move || {
        let mut seen = Vec::new();
        while let Some(frame) = rx.recv() {
            let marker = (frame.index() % 251) as u8;
            assert!(
                frame.y().iter().all(|&v| v == marker),
                "frame {} was modified while being read",
                frame.index()
            );
            seen.push(frame.index());
        }
        seen
    });

    for index in 0..FRAMES {
        let mut frame = tx.acquire(index).unwrap();
        let marker = (index % 251) as u8;
        let (y, _, _) = frame.planes_mut();
        y.fill(marker);
        tx.send(frame).unwrap();
    }
    // Returns once the last frame has been taken.
    let spare = tx.acquire(FRAMES).unwrap();
    tx.cancel(spare);
    tx.close();

    let seen = consumer.join().unwrap();
    assert_eq!(seen, (0..FRAMES).collect::<Vec<_>>());
}

#[test]
fn close_releases_a_producer_blocked_on_a_slow_consumer() {
    let (mut tx, mut rx) = frame_handoff(frames(8, 8)).unwrap();

    let consumer = thread::spawn(move || {
        let held = rx.recv();
        thread::sleep(Duration::from_millis(50));
        rx.close();
        drop(held);
    });

    let (done_tx, done_rx) = mpsc::channel();
    let producer = thread::spawn(move || {
        let mut result = Ok(());
        for index in 0.. {
            match tx.acquire(index) {
                Ok(frame) => {
                    if let Err(e) = tx.send(frame) {
                        result = Err(e);
                        break;
                    }
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        let _ = done_tx.send(result.is_err());
    });

    let stopped = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("producer should be released by close");
    assert!(stopped);
    producer.join().unwrap();
    consumer.join().unwrap();
}
