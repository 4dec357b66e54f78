//! Summarize a packet file.

use std::path::PathBuf;

use serde::Serialize;

use screenmux_capture_engine::read_packet_file;
use screenmux_common::clock::TimeBase;

#[derive(Debug, Serialize)]
struct StreamSummary {
    index: usize,
    kind: String,
    time_base: String,
    packets: u64,
    bytes: u64,
    first_pts: Option<i64>,
    last_pts: Option<i64>,
    duration_ms: Option<i64>,
    trailer_packets: Option<u64>,
}

#[derive(Debug, Serialize)]
struct FileSummary {
    path: PathBuf,
    finished: bool,
    streams: Vec<StreamSummary>,
}

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let file = read_packet_file(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read packet file: {e}"))?;

    let streams = file
        .streams
        .iter()
        .map(|info| {
            let packets: Vec<_> = file
                .packets
                .iter()
                .filter(|p| p.stream_index == info.index)
                .collect();
            let first_pts = packets.iter().map(|p| p.pts).min();
            let last_pts = packets.iter().map(|p| p.pts).max();
            StreamSummary {
                index: info.index,
                kind: info.kind.to_string(),
                time_base: info.time_base.to_string(),
                packets: packets.len() as u64,
                bytes: packets.iter().map(|p| p.data.len() as u64).sum(),
                first_pts,
                last_pts,
                duration_ms: first_pts
                    .zip(last_pts)
                    .map(|(first, last)| info.time_base.rescale(last - first, TimeBase::MILLIS)),
                trailer_packets: file
                    .trailer
                    .as_ref()
                    .and_then(|counts| counts.get(info.index).copied()),
            }
        })
        .collect();

    let summary = FileSummary {
        path,
        finished: file.trailer.is_some(),
        streams,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Packet file: {}", summary.path.display());
    println!(
        "  Finished: {}",
        if summary.finished { "yes" } else { "no (missing trailer)" }
    );
    println!();
    for s in &summary.streams {
        println!("Stream {} ({}, time base {}):", s.index, s.kind, s.time_base);
        println!("  Packets: {} ({} bytes)", s.packets, s.bytes);
        if let (Some(first), Some(last)) = (s.first_pts, s.last_pts) {
            println!("  PTS: {first} .. {last}");
        }
        if let Some(ms) = s.duration_ms {
            println!("  Span: {:.2}s", ms as f64 / 1000.0);
        }
        if let Some(expected) = s.trailer_packets {
            if expected != s.packets {
                println!("  Warning: trailer records {expected} packets");
            }
        }
    }
    Ok(())
}
