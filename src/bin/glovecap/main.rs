//! Command line front end: list ports, inspect a sensor table, or capture.

use clap::Parser;
use glovecap::{
    acquisition::Acquisition,
    args::{
        CaptureCommand,
        CommandTask::{Capture, Inspect, Ports},
        GloveArgs, InspectCommand,
    },
    config::GloveConfig,
    gui::{device_selector, fold_until_stop},
    pipeline::{GlovePipeline, SensorSample},
    remapper::SensorRemapper,
    sensor_table::SensorTable,
    transport::SerialTransport,
};

use log::{debug, info, warn};
use std::{
    error::Error,
    ops::ControlFlow,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

// Example:
// cargo run -- capture --sensor-map glove_sensor_map.csv --port /dev/ttyACM0

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = GloveArgs::parse();

    let config = match &args.config {
        Some(path) => GloveConfig::from_path(path)?,
        None => GloveConfig::default(),
    };
    debug!("Using {:?}", config);

    match args.command {
        Ports => list_ports(),
        Inspect(cmd) => inspect(&config, &cmd),
        Capture(cmd) => capture(config, cmd),
    }
}

fn list_ports() -> Result<(), Box<dyn Error>> {
    let ports = SerialTransport::available_ports()?;
    if ports.is_empty() {
        println!("No serial devices found");
    } else {
        println!("Available devices:");
        for port in ports {
            println!("\t{}", port.to_string_lossy());
        }
    }
    Ok(())
}

fn inspect(config: &GloveConfig, cmd: &InspectCommand) -> Result<(), Box<dyn Error>> {
    let table = Arc::new(SensorTable::from_path(&cmd.sensor_map)?);
    let remapper = SensorRemapper::new(Arc::clone(&table), config.frame_len())?;

    println!(
        "{}: {} sensors, {} assigned, {} unassigned, {}-byte frame",
        cmd.sensor_map.display(),
        table.len(),
        table.assigned().count(),
        table.unassigned().count(),
        remapper.frame_len(),
    );

    println!("Regions:");
    for region in table.regions() {
        let total = table.sensors_in_region(region).count();
        let assigned = table
            .sensors_in_region(region)
            .filter(|s| s.offset.is_some())
            .count();
        println!("\t{:<16} {:>3}/{:<3} assigned", region, assigned, total);
    }

    let offsets = table.unique_offsets();
    if let (Some(first), Some(last)) = (offsets.first(), offsets.last()) {
        println!("{} distinct offsets, {} to {}", offsets.len(), first, last);
    }

    let shared = table.shared_offsets();
    if !shared.is_empty() {
        println!("Shared offsets:");
        for (offset, ids) in &shared {
            println!("\t{:>3}: sensors {:?}", offset, ids);
        }
    }

    let unassigned: Vec<_> = table.unassigned().collect();
    if !unassigned.is_empty() {
        println!("Unassigned sensors:");
        for sensor in unassigned {
            match sensor.position {
                Some(p) => println!(
                    "\t{:>3} {:<16} at ({:.1}, {:.1}) mm",
                    sensor.id, sensor.region, p.x_mm, p.y_mm
                ),
                None => println!("\t{:>3} {:<16}", sensor.id, sensor.region),
            }
        }
    }

    Ok(())
}

fn capture(mut config: GloveConfig, cmd: CaptureCommand) -> Result<(), Box<dyn Error>> {
    if let Some(baud) = cmd.baud {
        config.baud_rate = baud;
    }

    let table = Arc::new(SensorTable::from_path(&cmd.sensor_map)?);
    let pipeline = GlovePipeline::new(&config, table)?;
    let remapper = pipeline.remapper().clone();

    let port = match cmd.port {
        Some(port) => port,
        None => match device_selector(SerialTransport::available_ports()?)? {
            Some(port) => port,
            None => {
                info!("No device selected");
                return Ok(());
            }
        },
    };

    let transport = SerialTransport::open(&port, config.baud_rate, config.read_timeout())?;
    let mut acq = Acquisition::start(transport, pipeline, &config);

    let consumed = if cmd.headless {
        run_headless(&acq, cmd.frames)
    } else {
        run_monitor(&acq, &remapper, &port.to_string_lossy(), cmd.frames)?
    };

    info!("Consumed {} frames", consumed);
    info!("{}", acq.stats());
    acq.stop()?;
    Ok(())
}

fn run_headless(acq: &Acquisition, limit: Option<u64>) -> u64 {
    let mut consumed = 0;
    let mut last_report = Instant::now();

    while limit.map_or(true, |n| consumed < n) {
        match acq.next_sample(POLL_TIMEOUT) {
            Some(sample) => {
                debug!("Frame {}: {:?}", sample.frame_number, sample.values);
                consumed += 1;
            }
            None if !acq.is_running() => {
                warn!("Acquisition ended early");
                break;
            }
            None => {}
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            info!("{}", acq.stats());
            last_report = Instant::now();
        }
    }

    consumed
}

fn run_monitor(
    acq: &Acquisition,
    remapper: &SensorRemapper,
    port: &str,
    limit: Option<u64>,
) -> Result<u64, Box<dyn Error>> {
    let latest: Arc<Mutex<Option<SensorSample>>> = Arc::new(Mutex::new(None));
    let worker_latest = Arc::clone(&latest);
    let rx = acq.receiver();

    let consumed = fold_until_stop(
        &format!("Capturing from {}", port),
        0u64,
        move |consumed| {
            let Some(sample) = rx.next_sample(POLL_TIMEOUT) else {
                return ControlFlow::Continue(consumed);
            };
            *worker_latest.lock().unwrap() = Some(sample);

            let consumed = consumed + 1;
            if limit.is_some_and(|n| consumed >= n) {
                ControlFlow::Break(consumed)
            } else {
                ControlFlow::Continue(consumed)
            }
        },
        || {
            let mut lines = vec![acq.stats().to_string()];
            if !acq.is_running() {
                lines.push("Device disconnected".to_owned());
            }
            if let Some(sample) = latest.lock().unwrap().as_ref() {
                lines.push(format!("Latest frame: {}", sample.frame_number));
                for (region, stats) in remapper.all_region_stats(&sample.values) {
                    lines.push(format!(
                        "{:<16} max {:>3}  mean {:>6.1}  active {:>3}/{:<3}",
                        region, stats.max, stats.mean, stats.active_count, stats.sensor_count
                    ));
                }
            }
            lines
        },
    )?;

    Ok(consumed)
}
