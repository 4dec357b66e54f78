//! Time RGBA to I420 conversion on a synthetic frame.

use screenmux_capture_engine::{FrameConverter, StageTimer, YuvFrame};
use screenmux_common::config::{ColorOrder, Rotation};

use crate::synthetic::TestPattern;

pub fn run(width: usize, height: usize, rotation: Rotation, iterations: u32) -> anyhow::Result<()> {
    let converter = FrameConverter::new(width, height, 0, 0, rotation)?;
    let (source_width, source_height) = converter.source_size();
    let mut pattern = TestPattern::new(source_width, source_height, ColorOrder::Rgba);
    pattern.advance();
    let pixels = pattern.pixels()?;
    let mut frame = YuvFrame::new(width, height, 0);

    let (out_width, out_height) = converter.output_size();
    println!(
        "Converting {source_width}x{source_height} -> {out_width}x{out_height} ({:?})",
        converter.rotation()
    );

    let mut timer = StageTimer::default();
    for _ in 0..iterations.max(1) {
        timer.time(|| converter.convert(&pixels, &mut frame))?;
    }

    let avg = timer.avg_ms();
    println!("  Iterations: {}", timer.count);
    println!("  Average: {avg:.3} ms");
    println!("  Worst: {:.3} ms", timer.max_ms());
    if avg > 0.0 {
        println!("  Throughput: {:.1} frames/s", 1000.0 / avg);
    }
    Ok(())
}
