use anyhow::{bail, Context, Result};
use crabscan::permissions::check_permission_detailed;
use crabscan::platform::list_cameras;
use crabscan::{ScanEvent, ScanSession, ScannerConfig};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const USAGE: &str = "Usage: crabscan-cli <command> [args]

Commands:
  list-devices [--json]
  permission [--json]
  scan [<device_id>] [--auto] [--frames N] [--output DIR] [--config PATH] [--json]";

fn main() -> Result<()> {
    crabscan::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    match args[1].as_str() {
        "list-devices" => cmd_list_devices(&args),
        "permission" => cmd_permission(&args),
        "scan" => cmd_scan(&args),
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(1);
        }
    }
}

fn wants_json(args: &[String]) -> bool {
    args.iter().any(|a| a == "--json")
}

fn cmd_list_devices(args: &[String]) -> Result<()> {
    let devices = list_cameras().context("failed to list cameras")?;
    if wants_json(args) {
        println!("{}", serde_json::to_string(&devices)?);
    } else if devices.is_empty() {
        println!("No cameras found");
    } else {
        for d in devices {
            println!("{}: {} ({:?})", d.id, d.name, d.position);
        }
    }
    Ok(())
}

fn cmd_permission(args: &[String]) -> Result<()> {
    let info = check_permission_detailed();
    if wants_json(args) {
        println!("{}", serde_json::to_string(&info)?);
    } else {
        println!("{}: {}", info.status, info.message);
    }
    Ok(())
}

struct ScanArgs {
    device_id: Option<String>,
    auto: bool,
    frames: u32,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
}

fn parse_scan_args(args: &[String]) -> Result<ScanArgs> {
    let mut parsed = ScanArgs {
        device_id: None,
        auto: false,
        frames: 1,
        output: None,
        config: None,
        json: false,
    };

    let mut iter = args.iter().skip(2);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--auto" => parsed.auto = true,
            "--json" => parsed.json = true,
            "--frames" => {
                let value = iter.next().context("--frames needs a value")?;
                parsed.frames = value.parse().context("--frames must be a number")?;
            }
            "--output" => {
                parsed.output = Some(iter.next().context("--output needs a value")?.into());
            }
            "--config" => {
                parsed.config = Some(iter.next().context("--config needs a value")?.into());
            }
            flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            device if parsed.device_id.is_none() => parsed.device_id = Some(device.to_string()),
            extra => bail!("Unexpected argument: {}", extra),
        }
    }

    if parsed.frames == 0 {
        bail!("--frames must be at least 1");
    }
    Ok(parsed)
}

/// Scan until `--frames` photos are taken. Without `--auto` a photo is
/// requested by hand as soon as a document shows up.
fn cmd_scan(args: &[String]) -> Result<()> {
    let scan = parse_scan_args(args)?;

    let config_path = scan.config.clone().unwrap_or_else(ScannerConfig::default_path);
    let mut config = ScannerConfig::load_layered(&config_path)
        .with_context(|| format!("failed to load {:?}", config_path))?;
    if scan.device_id.is_some() {
        config.camera.device_id = scan.device_id.clone();
    }
    if let Some(dir) = &scan.output {
        config.storage.output_directory = dir.to_string_lossy().into_owned();
        config.storage.save_captures = true;
    }
    config.auto_capture.enabled = scan.auto;
    let join_timeout = Duration::from_millis(config.session.join_timeout_ms);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    let session = ScanSession::open(config)?;
    session.start().context("failed to start scanning")?;
    if !scan.json {
        println!("Scanning... press Ctrl-C to stop");
    }

    let mut taken = 0;
    let mut manual_pending = false;
    while taken < scan.frames && !interrupted.load(Ordering::SeqCst) {
        let event = match session.next_event(Duration::from_millis(100))? {
            Some(event) => event,
            None => continue,
        };

        if scan.json {
            println!("{}", serde_json::to_string(&event)?);
        }

        match &event {
            ScanEvent::QuadDetected { counter, .. } => {
                if !scan.auto && !manual_pending {
                    session.request_capture()?;
                    manual_pending = true;
                } else if !scan.json {
                    println!("Document detected, stable for {}", counter);
                }
            }
            ScanEvent::QuadLost { .. } if !scan.json => println!("Document lost"),
            ScanEvent::PhotoCaptured(photo) => {
                taken += 1;
                manual_pending = false;
                if !scan.json {
                    match &photo.saved_path {
                        Some(path) => println!("Captured {} -> {}", photo.id, path.display()),
                        None => println!("Captured {} ({} bytes)", photo.id, photo.data.len()),
                    }
                }
            }
            ScanEvent::CaptureFailed { message, .. } => {
                manual_pending = false;
                eprintln!("Capture failed: {}", message);
            }
            ScanEvent::SourceFailed { message, .. } => {
                session.close(join_timeout)?;
                bail!("Camera failed: {}", message);
            }
            ScanEvent::SourceEnded => break,
            _ => {}
        }
    }

    let stats = session.stats();
    session.close(join_timeout)?;
    if scan.json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!(
            "{} frames, {} sampled, {} detections, {} photos",
            stats.frames_seen, stats.frames_sampled, stats.detections, stats.captures
        );
    }
    Ok(())
}
