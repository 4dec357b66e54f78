//! The muxed output both streams write into.
//!
//! Video packets are written from the encoding worker and audio packets
//! from the render thread, so the sink sits behind one mutex held for
//! exactly one `write_packet` call.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use screenmux_common::clock::TimeBase;
use screenmux_common::error::{ScreenmuxError, ScreenmuxResult, StreamKind};

use crate::encoder::{EncodedPacket, StreamInfo};

/// Container writer contract.
pub trait OutputSink: Send {
    /// Write one packet; `packet.stream_index` selects the stream.
    fn write_packet(&mut self, packet: &EncodedPacket) -> ScreenmuxResult<()>;

    /// Write the trailer and flush. Called once, after both streams end.
    fn finish(&mut self) -> ScreenmuxResult<()>;
}

/// A sink shared between the render thread and the encoding worker.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<Mutex<Box<dyn OutputSink>>>,
}

impl SharedSink {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    pub fn write(&self, packet: &EncodedPacket) -> ScreenmuxResult<()> {
        self.inner.lock().write_packet(packet)
    }

    pub fn finish(&self) -> ScreenmuxResult<()> {
        self.inner.lock().finish()
    }
}

/// What a [`MemorySink`] has received.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    pub packets: Vec<EncodedPacket>,
    pub finished: bool,
}

impl MemoryOutput {
    /// Packets of one stream, in write order.
    pub fn stream(&self, index: usize) -> Vec<&EncodedPacket> {
        self.packets
            .iter()
            .filter(|p| p.stream_index == index)
            .collect()
    }
}

/// Collects packets in memory. Clones share the same storage, so a caller
/// can keep one to inspect after handing the other to a pipeline.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    output: Arc<Mutex<MemoryOutput>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the collected output.
    pub fn with_output<T>(&self, f: impl FnOnce(&MemoryOutput) -> T) -> T {
        f(&self.output.lock())
    }
}

impl OutputSink for MemorySink {
    fn write_packet(&mut self, packet: &EncodedPacket) -> ScreenmuxResult<()> {
        let mut output = self.output.lock();
        if output.finished {
            return Err(ScreenmuxError::write("Sink already finished"));
        }
        output.packets.push(packet.clone());
        Ok(())
    }

    fn finish(&mut self) -> ScreenmuxResult<()> {
        self.output.lock().finished = true;
        Ok(())
    }
}

const MAGIC: &[u8; 8] = b"SMUXPKT1";
const TAG_PACKET: u8 = b'P';
const TAG_TRAILER: u8 = b'T';
const FLAG_KEYFRAME: u8 = 0x01;

/// Writes packets to a simple length-prefixed file.
///
/// Layout, little-endian throughout:
/// - header: magic, stream count (u8), then per stream kind (u8),
///   time base num and den (i64 each)
/// - packet: `'P'`, stream (u8), flags (u8), pts (i64), length (u32), data
/// - trailer: `'T'`, stream count (u8), packet count per stream (u64)
pub struct PacketFileSink {
    writer: BufWriter<File>,
    path: PathBuf,
    packet_counts: Vec<u64>,
    finished: bool,
}

impl PacketFileSink {
    /// Create the file and write its header.
    pub fn create(path: impl Into<PathBuf>, streams: &[StreamInfo]) -> ScreenmuxResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        for (expected, stream) in streams.iter().enumerate() {
            if stream.index != expected {
                return Err(ScreenmuxError::config(format!(
                    "Stream {} listed at position {expected}",
                    stream.index
                )));
            }
        }
        let count = u8::try_from(streams.len())
            .map_err(|_| ScreenmuxError::config("Too many output streams"))?;

        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(MAGIC)?;
        writer.write_all(&[count])?;
        for stream in streams {
            let kind = match stream.kind {
                StreamKind::Video => 0u8,
                StreamKind::Audio => 1u8,
            };
            writer.write_all(&[kind])?;
            writer.write_all(&stream.time_base.num.to_le_bytes())?;
            writer.write_all(&stream.time_base.den.to_le_bytes())?;
        }

        tracing::debug!(path = %path.display(), streams = streams.len(), "Packet file opened");
        Ok(Self {
            writer,
            path,
            packet_counts: vec![0; streams.len()],
            finished: false,
        })
    }
}

impl OutputSink for PacketFileSink {
    fn write_packet(&mut self, packet: &EncodedPacket) -> ScreenmuxResult<()> {
        if self.finished {
            return Err(ScreenmuxError::write("Packet file already finished"));
        }
        let Some(count) = self.packet_counts.get_mut(packet.stream_index) else {
            return Err(ScreenmuxError::write(format!(
                "Unknown stream index {}",
                packet.stream_index
            )));
        };
        let len = u32::try_from(packet.data.len())
            .map_err(|_| ScreenmuxError::write("Packet larger than 4 GiB"))?;
        let flags = if packet.keyframe { FLAG_KEYFRAME } else { 0 };

        self.writer
            .write_all(&[TAG_PACKET, packet.stream_index as u8, flags])
            .and_then(|_| self.writer.write_all(&packet.pts.to_le_bytes()))
            .and_then(|_| self.writer.write_all(&len.to_le_bytes()))
            .and_then(|_| self.writer.write_all(&packet.data))
            .map_err(|e| ScreenmuxError::write(format!("Failed to write packet: {e}")))?;
        *count += 1;
        Ok(())
    }

    fn finish(&mut self) -> ScreenmuxResult<()> {
        if self.finished {
            return Ok(());
        }
        self.writer.write_all(&[TAG_TRAILER, self.packet_counts.len() as u8])?;
        for count in &self.packet_counts {
            self.writer.write_all(&count.to_le_bytes())?;
        }
        self.writer
            .flush()
            .map_err(|e| ScreenmuxError::write(format!("Failed to flush packet file: {e}")))?;
        self.finished = true;
        tracing::debug!(
            path = %self.path.display(),
            packets = ?self.packet_counts,
            "Packet file finished"
        );
        Ok(())
    }
}

/// A packet file read back from disk.
#[derive(Debug)]
pub struct PacketFile {
    pub streams: Vec<StreamInfo>,
    pub packets: Vec<EncodedPacket>,
    /// Per-stream packet counts from the trailer; `None` if the file was
    /// never finished.
    pub trailer: Option<Vec<u64>>,
}

/// Parse a file written by [`PacketFileSink`].
pub fn read_packet_file(path: &Path) -> ScreenmuxResult<PacketFile> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(corrupt(format!("{} is not a packet file", path.display())));
    }

    let stream_count = read_u8(&mut reader)? as usize;
    let mut streams = Vec::with_capacity(stream_count);
    for index in 0..stream_count {
        let kind = match read_u8(&mut reader)? {
            0 => StreamKind::Video,
            1 => StreamKind::Audio,
            other => return Err(corrupt(format!("Unknown stream kind {other}"))),
        };
        let num = read_i64(&mut reader)?;
        let den = read_i64(&mut reader)?;
        streams.push(StreamInfo {
            index,
            kind,
            time_base: TimeBase::new(num, den),
        });
    }

    let mut packets = Vec::new();
    let mut trailer = None;
    loop {
        let mut tag = [0u8; 1];
        if reader.read(&mut tag)? == 0 {
            break;
        }
        match tag[0] {
            TAG_PACKET => {
                let stream_index = read_u8(&mut reader)? as usize;
                let flags = read_u8(&mut reader)?;
                let pts = read_i64(&mut reader)?;
                let mut len = [0u8; 4];
                reader.read_exact(&mut len)?;
                let mut data = vec![0u8; u32::from_le_bytes(len) as usize];
                reader.read_exact(&mut data)?;
                packets.push(EncodedPacket {
                    data,
                    stream_index,
                    pts,
                    keyframe: flags & FLAG_KEYFRAME != 0,
                });
            }
            TAG_TRAILER => {
                let count = read_u8(&mut reader)? as usize;
                let mut counts = Vec::with_capacity(count);
                for _ in 0..count {
                    let mut buf = [0u8; 8];
                    reader.read_exact(&mut buf)?;
                    counts.push(u64::from_le_bytes(buf));
                }
                trailer = Some(counts);
                break;
            }
            other => {
                return Err(corrupt(format!(
                    "Corrupt packet file: unexpected record tag {other:#04x}"
                )))
            }
        }
    }

    Ok(PacketFile {
        streams,
        packets,
        trailer,
    })
}

fn corrupt(msg: String) -> ScreenmuxError {
    ScreenmuxError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}

fn read_u8(reader: &mut impl Read) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_i64(reader: &mut impl Read) -> std::io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}
