use std::time::Duration;

use screenmux_capture_engine::{
    read_packet_file, AudioEncoder, AudioFrame, CaptureSession, EncodedPacket, MemorySink,
    OutputSink, PacketFileSink, PcmAudioEncoder, PixelBuffer, RawVideoEncoder, SessionConfig,
    SessionState, VideoEncoder, WorkerState, YuvFrame, AUDIO_STREAM_INDEX, VIDEO_STREAM_INDEX,
};
use screenmux_common::clock::TimeBase;
use screenmux_common::config::{ColorOrder, Rotation};
use screenmux_common::error::{ScreenmuxError, ScreenmuxResult, StreamKind};

const WIDTH: usize = 16;
const HEIGHT: usize = 12;
const FRAME_SIZE: usize = 1024;

fn config() -> SessionConfig {
    SessionConfig {
        width: WIDTH,
        height: HEIGHT,
        padding_width: 0,
        padding_height: 0,
        rotation: Rotation::None,
        sample_rate: 8000,
        video_time_base: TimeBase::new(1, 1000),
    }
}

fn screen(shade: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(WIDTH * HEIGHT * 4);
    for _ in 0..WIDTH * HEIGHT {
        data.extend_from_slice(&[shade, shade, shade, 255]);
    }
    data
}

#[test]
fn session_muxes_video_and_audio_in_order() {
    let sink = MemorySink::new();
    let (mut session, mut audio) = CaptureSession::start(
        config(),
        Box::new(RawVideoEncoder::new()),
        Box::new(PcmAudioEncoder::new(FRAME_SIZE)),
        Box::new(sink.clone()),
    )
    .unwrap();

    let block = vec![1000i16; 800];
    for i in 0..30u8 {
        assert_eq!(audio.push_block(&block), 0);
        let data = screen(i * 8);
        let pixels = PixelBuffer::new(&data, WIDTH, HEIGHT, WIDTH, ColorOrder::Rgba).unwrap();
        session.render_frame(&pixels).unwrap();
    }
    let report = session.stop().unwrap();

    assert_eq!(report.stats.frames_captured, 30);
    assert_eq!(report.stats.frames_encoded, 30);
    assert_eq!(report.stats.audio_frames, (30 * 800 / FRAME_SIZE) as u64);
    assert_eq!(report.stats.audio_overruns, 0);
    assert_eq!(report.stats.frames_discarded, 0);
    assert_eq!(report.stats.drop_rate(), 0.0);

    sink.with_output(|out| {
        assert!(out.finished);

        let video = out.stream(VIDEO_STREAM_INDEX);
        assert_eq!(video.len(), 30);
        assert!(video.windows(2).all(|w| w[0].pts <= w[1].pts));
        let luma_len = WIDTH * HEIGHT;
        assert!(video
            .iter()
            .all(|p| p.data.len() == luma_len + luma_len / 2));

        let audio = out.stream(AUDIO_STREAM_INDEX);
        assert_eq!(audio.len(), 23);
        for (k, packet) in audio.iter().enumerate() {
            assert_eq!(packet.pts, (k * FRAME_SIZE) as i64);
            assert_eq!(packet.data.len(), FRAME_SIZE * 4);
        }
    });
}

#[test]
fn converted_planes_reach_the_encoder() {
    let sink = MemorySink::new();
    let (mut session, _audio) = CaptureSession::start(
        config(),
        Box::new(RawVideoEncoder::new()),
        Box::new(PcmAudioEncoder::new(FRAME_SIZE)),
        Box::new(sink.clone()),
    )
    .unwrap();

    let data = screen(128);
    let pixels = PixelBuffer::new(&data, WIDTH, HEIGHT, WIDTH, ColorOrder::Rgba).unwrap();
    session.render_frame(&pixels).unwrap();
    session.stop().unwrap();

    sink.with_output(|out| {
        let packet = out.stream(VIDEO_STREAM_INDEX)[0];
        let (y, chroma) = packet.data.split_at(WIDTH * HEIGHT);
        assert!(y.iter().all(|&v| v == 126));
        assert!(chroma.iter().all(|&v| v == 128));
    });
}

/// Holds one frame back, like an encoder with B-frame delay.
struct DelayedEncoder {
    pending: Option<EncodedPacket>,
}

impl VideoEncoder for DelayedEncoder {
    fn name(&self) -> &str {
        "delayed"
    }

    fn encode(&mut self, frame: &YuvFrame) -> ScreenmuxResult<Option<EncodedPacket>> {
        let packet = EncodedPacket::new(vec![frame.index() as u8], frame.pts(), true);
        Ok(self.pending.replace(packet))
    }

    fn flush(&mut self) -> ScreenmuxResult<Vec<EncodedPacket>> {
        Ok(self.pending.take().into_iter().collect())
    }
}

#[test]
fn delayed_packets_are_flushed_on_stop() {
    let sink = MemorySink::new();
    let (mut session, _audio) = CaptureSession::start(
        config(),
        Box::new(DelayedEncoder { pending: None }),
        Box::new(PcmAudioEncoder::new(FRAME_SIZE)),
        Box::new(sink.clone()),
    )
    .unwrap();

    let data = screen(0);
    let pixels = PixelBuffer::new(&data, WIDTH, HEIGHT, WIDTH, ColorOrder::Rgba).unwrap();
    for _ in 0..5 {
        session.render_frame(&pixels).unwrap();
    }
    let report = session.stop().unwrap();
    assert_eq!(report.stats.video_packets, 5);

    sink.with_output(|out| {
        let order: Vec<u8> = out
            .stream(VIDEO_STREAM_INDEX)
            .iter()
            .map(|p| p.data[0])
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    });
}

struct BrokenVideoEncoder;

impl VideoEncoder for BrokenVideoEncoder {
    fn name(&self) -> &str {
        "broken"
    }

    fn encode(&mut self, _frame: &YuvFrame) -> ScreenmuxResult<Option<EncodedPacket>> {
        Err(ScreenmuxError::pipeline("hardware session lost"))
    }
}

#[test]
fn video_encoder_failure_surfaces_from_stop() {
    let (mut session, _audio) = CaptureSession::start(
        config(),
        Box::new(BrokenVideoEncoder),
        Box::new(PcmAudioEncoder::new(FRAME_SIZE)),
        Box::new(MemorySink::new()),
    )
    .unwrap();

    let data = screen(0);
    let pixels = PixelBuffer::new(&data, WIDTH, HEIGHT, WIDTH, ColorOrder::Rgba).unwrap();
    let mut failed = false;
    for _ in 0..50 {
        if session.render_frame(&pixels).is_err() {
            failed = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(failed, "render_frame should notice the dead worker");
    assert_eq!(session.state(), SessionState::Error);

    match session.stop() {
        Err(ScreenmuxError::Encode { stream, message }) => {
            assert_eq!(stream, StreamKind::Video);
            assert!(message.contains("hardware session lost"));
        }
        other => panic!("unexpected stop result: {other:?}"),
    }
}

struct BrokenAudioEncoder;

impl AudioEncoder for BrokenAudioEncoder {
    fn name(&self) -> &str {
        "broken"
    }

    fn frame_size(&self) -> usize {
        FRAME_SIZE
    }

    fn encode(&mut self, _frame: &AudioFrame<'_>) -> ScreenmuxResult<Option<EncodedPacket>> {
        Err(ScreenmuxError::audio("codec rejected frame"))
    }
}

#[test]
fn audio_encoder_failure_fails_the_tick() {
    let (mut session, mut audio) = CaptureSession::start(
        config(),
        Box::new(RawVideoEncoder::new()),
        Box::new(BrokenAudioEncoder),
        Box::new(MemorySink::new()),
    )
    .unwrap();

    audio.push_block(&vec![0i16; FRAME_SIZE]);
    let data = screen(0);
    let pixels = PixelBuffer::new(&data, WIDTH, HEIGHT, WIDTH, ColorOrder::Rgba).unwrap();
    match session.render_frame(&pixels) {
        Err(ScreenmuxError::Encode { stream, .. }) => assert_eq!(stream, StreamKind::Audio),
        other => panic!("unexpected render result: {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.render_frame(&pixels).is_err());
    match session.stop() {
        Err(ScreenmuxError::Encode { stream, message }) => {
            assert_eq!(stream, StreamKind::Audio);
            assert!(message.contains("codec rejected frame"));
        }
        other => panic!("unexpected stop result: {other:?}"),
    }
}

/// Fails every write after the first `limit`.
struct FlakySink {
    limit: usize,
    written: usize,
}

impl OutputSink for FlakySink {
    fn write_packet(&mut self, _packet: &EncodedPacket) -> ScreenmuxResult<()> {
        if self.written >= self.limit {
            return Err(ScreenmuxError::write("disk full"));
        }
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> ScreenmuxResult<()> {
        Ok(())
    }
}

#[test]
fn sink_failure_in_worker_stops_the_pipeline() {
    let (mut session, _audio) = CaptureSession::start(
        config(),
        Box::new(RawVideoEncoder::new()),
        Box::new(PcmAudioEncoder::new(FRAME_SIZE)),
        Box::new(FlakySink {
            limit: 2,
            written: 0,
        }),
    )
    .unwrap();

    let data = screen(0);
    let pixels = PixelBuffer::new(&data, WIDTH, HEIGHT, WIDTH, ColorOrder::Rgba).unwrap();
    for _ in 0..50 {
        if session.render_frame(&pixels).is_err() {
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(matches!(session.stop(), Err(ScreenmuxError::Write { .. })));
}

#[test]
fn packet_file_records_both_streams() {
    let dir = std::env::temp_dir().join("screenmux_test_e2e_packet_file");
    let _ = std::fs::remove_dir_all(&dir);
    let path = dir.join("session.smux");
    let config = config();
    let sink = PacketFileSink::create(&path, &config.streams()).unwrap();
    let (mut session, mut audio) = CaptureSession::start(
        config,
        Box::new(RawVideoEncoder::new()),
        Box::new(PcmAudioEncoder::new(FRAME_SIZE)),
        Box::new(sink),
    )
    .unwrap();

    let data = screen(64);
    let pixels = PixelBuffer::new(&data, WIDTH, HEIGHT, WIDTH, ColorOrder::Rgba).unwrap();
    for _ in 0..4 {
        audio.push_block(&vec![0i16; FRAME_SIZE]);
        session.render_frame(&pixels).unwrap();
    }
    session.stop().unwrap();

    let file = read_packet_file(&path).unwrap();
    assert_eq!(file.streams.len(), 2);
    assert_eq!(file.trailer, Some(vec![4, 4]));
    assert_eq!(file.packets.len(), 8);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stop_while_worker_waits_ends_without_phantom_frame() {
    let sink = MemorySink::new();
    let (session, _audio) = CaptureSession::start(
        config(),
        Box::new(RawVideoEncoder::new()),
        Box::new(PcmAudioEncoder::new(FRAME_SIZE)),
        Box::new(sink.clone()),
    )
    .unwrap();

    for _ in 0..2000 {
        if session.worker_state() == WorkerState::WaitingForFrame {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    // The worker leaves `Starting` only on its way into `recv`.
    assert_eq!(session.worker_state(), WorkerState::WaitingForFrame);
    std::thread::sleep(Duration::from_millis(20));

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = done_tx.send(session.stop().map(|r| r.stats.frames_encoded));
    });
    let encoded = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("stop should join the idle worker promptly")
        .unwrap();

    assert_eq!(encoded, 0);
    sink.with_output(|out| {
        assert!(out.finished);
        assert!(out.packets.is_empty());
    });
}
