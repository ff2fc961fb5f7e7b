use std::sync::Arc;

use clap::Parser;
use v4l_capture::control::{self, Registry};
use v4l_capture::Device;

/// Lists the controls of a device and optionally sets one
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Capture device node path or index
    #[arg(short, long, default_value = "/dev/video0")]
    device: String,

    /// Control to set, as ID (e.g. 0x00980900) or name (e.g. Brightness)
    #[arg(long, requires = "value")]
    set: Option<String>,

    /// Value to set the control to
    #[arg(long, allow_hyphen_values = true)]
    value: Option<i64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut path = args.device;
    if path.parse::<u64>().is_ok() {
        path = format!("/dev/video{}", path);
    }
    println!("Using device: {}\n", path);

    let dev = Device::with_path(&path)?;
    println!("Device capabilities:\n{}", dev.caps());

    let controls = Registry::new(Arc::new(dev));
    let mut described = Vec::new();
    for ctrl in controls.enumerate() {
        let ctrl = ctrl?;
        match controls.get_value(ctrl.id) {
            Ok(value) => println!("{}Value      : {}\n", ctrl, value),
            Err(e) => println!("{}Value      : <{}>\n", ctrl, e),
        }
        described.push(ctrl);
    }

    if let (Some(target), Some(value)) = (args.set, args.value) {
        let id = parse_id(&target)
            .or_else(|| {
                described
                    .iter()
                    .find(|ctrl| ctrl.name.eq_ignore_ascii_case(&target))
                    .map(|ctrl| ctrl.id)
            })
            .ok_or_else(|| format!("unknown control: {}", target))?;

        controls.set_value(id, value)?;
        println!("{} is now {}", target, controls.get_value(id)?);
    }

    Ok(())
}

fn parse_id(s: &str) -> Option<u32> {
    match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok().filter(|id| *id >= control::id::USER_BASE),
    }
}
