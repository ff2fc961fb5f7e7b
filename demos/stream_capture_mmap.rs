use std::time::{Duration, Instant};

use clap::Parser;
use v4l_capture::prelude::*;

/// Captures frames through memory-mapped buffers and reports throughput
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Capture device node path or index
    #[arg(short, long, default_value = "/dev/video0")]
    device: String,

    /// Frame width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Pixel format as four character code
    #[arg(long, default_value = "YUYV")]
    fourcc: String,

    /// Number of buffers to request
    #[arg(short, long, default_value_t = 4)]
    buffers: u32,

    /// Number of frames to capture
    #[arg(short, long, default_value_t = 4)]
    count: u32,

    /// Frame timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("v4l_capture=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut path = args.device;
    if path.parse::<u64>().is_ok() {
        path = format!("/dev/video{}", path);
    }
    println!("Using device: {}\n", path);

    let repr: [u8; 4] = args
        .fourcc
        .as_bytes()
        .try_into()
        .map_err(|_| format!("invalid four character code: {}", args.fourcc))?;

    let config = Config::default()
        .with_path(&path)
        .with_format(Format::new(args.width, args.height, FourCC::new(&repr)))
        .with_buffers(args.buffers)
        .with_timeout(Duration::from_millis(args.timeout));
    let mut session = Session::with_config(&config)?;

    if let Some(format) = session.format() {
        println!("Active format:\n{}", format);
        if format.fourcc != config.format.fourcc {
            println!("{} is not offered, the device supports:", config.format.fourcc);
            for desc in session.device().enum_formats()? {
                println!("  {}", desc);
            }
            println!();
        }
    }

    // warmup
    session.get_frame()?;

    let start = Instant::now();
    let mut megabytes_ps: f64 = 0.0;
    for i in 0..args.count {
        let t0 = Instant::now();
        let frame = session.get_frame()?;
        let duration_us = t0.elapsed().as_micros().max(1);

        let cur = frame.len() as f64 / 1_048_576.0 * 1_000_000.0 / duration_us as f64;
        if i == 0 {
            megabytes_ps = cur;
        } else {
            // ignore the first measurement
            let prev = megabytes_ps * (i as f64 / (i + 1) as f64);
            let now = cur * (1.0 / (i + 1) as f64);
            megabytes_ps = prev + now;
        }

        println!("Frame");
        println!("  sequence  : {}", frame.sequence());
        println!("  timestamp : {}", frame.timestamp());
        println!("  flags     : {}", frame.flags());
        println!("  dropped   : {}", frame.dropped());
        println!("  length    : {}", frame.bytes_used());
    }

    println!();
    println!("FPS: {}", args.count as f64 / start.elapsed().as_secs_f64());
    println!("MB/s: {}", megabytes_ps);

    session.close()?;
    Ok(())
}
