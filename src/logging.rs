use anyhow::Result;
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use log::{debug, info, LevelFilter};

const CRATE_TARGET: &str = "spinnaker_camera";
const SIM_TARGET: &str = "spinnaker_camera::sdk::sim";

/// Installs the global logger: colored console output, plus a plain file
/// sink with full dates when `log_file` is set.
///
/// Verbosity 0 logs info, 1 debug, 2 and above trace. The simulated SDK
/// logs every conversion at trace, so it stays at debug unless verbosity
/// is 3 or more.
pub fn setup_logging(verbosity: u8, log_file: Option<&str>) -> Result<()> {
    let level = level_for_verbosity(verbosity);
    let sim_level = match verbosity {
        0..=2 => level.min(LevelFilter::Debug),
        _ => LevelFilter::Trace,
    };

    let mut dispatch = fern::Dispatch::new()
        .level(level)
        .level_for(SIM_TARGET, sim_level)
        .chain(console_dispatch());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(file_dispatch().chain(fern::log_file(path)?));
    }

    dispatch.apply()?;

    info!("Logging system initialized at {} level", level);
    debug!("Debug logging enabled");
    Ok(())
}

fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Drops the crate prefix from a log target, `spinnaker_camera::camera::session`
/// becomes `camera::session`.
fn short_target(target: &str) -> &str {
    match target.strip_prefix(CRATE_TARGET) {
        Some("") => "main",
        Some(rest) => rest.trim_start_matches("::"),
        None => target,
    }
}

fn console_dispatch() -> fern::Dispatch {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {:<5} [{}] {}",
                Local::now().format("%H:%M:%S%.3f"),
                colors.color(record.level()),
                short_target(record.target()),
                message
            ))
        })
        .chain(std::io::stdout())
}

fn file_dispatch() -> fern::Dispatch {
    fern::Dispatch::new().format(|out, message, record| {
        out.finish(format_args!(
            "{} {:<5} [{}] {}",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
            record.level(),
            record.target(),
            message
        ))
    })
}

pub fn log_app_start(version: &str) {
    info!("Starting Spinnaker camera stream v{}", version);
}

pub fn log_app_config(config: &crate::config::Config) {
    info!("Application configured with:");
    info!("  Camera:");
    info!("    Grab timeout: {} ms", config.camera.grab_timeout_ms);
    for setting in &config.camera.settings {
        info!("    {}", setting);
    }
    info!("  Stream:");
    info!("    Buffer count: {}", config.stream.buffer_count);
    if let Some(mode) = &config.stream.buffer_handling_mode {
        info!("    Buffer handling mode: {}", mode);
    }
    info!("  Network:");
    info!("    Endpoint: tcp://{}:{}", config.network.address, config.network.port);
    info!("    Topic: {}", config.network.topic);
    info!("    Publish rate: {} Hz", config.network.publish_rate);
    info!("  Simulated camera:");
    info!("    Model: {} {}", config.sim.vendor, config.sim.model);
    info!(
        "    Sensor: {}x{} {}",
        config.sim.width, config.sim.height, config.sim.pixel_format
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for_verbosity(0), LevelFilter::Info);
        assert_eq!(level_for_verbosity(1), LevelFilter::Debug);
        assert_eq!(level_for_verbosity(2), LevelFilter::Trace);
        assert_eq!(level_for_verbosity(9), LevelFilter::Trace);
    }

    #[test]
    fn test_short_target() {
        assert_eq!(short_target("spinnaker_camera::camera::session"), "camera::session");
        assert_eq!(short_target("spinnaker_camera"), "main");
        assert_eq!(short_target("zmq"), "zmq");
    }
}
