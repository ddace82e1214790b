use spinnaker_camera::{
    cli::CliArgs,
    config::Config,
    error::{AppError, CameraError},
    logging,
    messaging::{PublishTimer, ZmqImagePublisher},
    node::{self, AcquisitionOptions},
};

use anyhow::Result;
use clap::Parser;
use log::{error, info};

fn main() -> Result<()> {
    // Parse command-line arguments
    let cli_args = CliArgs::parse();

    // Setup logging
    spinnaker_camera::initialize(cli_args.debug, cli_args.log_file.as_deref())?;

    // Load configuration
    let config = Config::load(&cli_args)?;
    logging::log_app_config(&config);

    let running = node::setup_shutdown_handler()?;

    // Initialize ZMQ publisher
    let publisher = ZmqImagePublisher::new(
        &config.network.address,
        config.network.port,
        &config.network.topic,
    )?;

    let mut session = spinnaker_camera::new_session(&config);
    let timer = PublishTimer::spawn(publisher, session.latest(), config.network.publish_period());

    let options = AcquisitionOptions::from_config(&config)
        .with_max_frames(cli_args.max_frames)
        .with_snapshot(cli_args.snapshot.clone());

    let outcome = node::run_acquisition(&mut session, &options, &running);
    let published = timer.stop();
    info!("Published {} image message(s)", published);

    match outcome {
        Ok(_) => {
            info!("Acquisition stopped, application shutting down");
            Ok(())
        }
        Err(AppError::Camera(CameraError::NoDeviceFound)) => {
            error!("No cameras detected, exiting");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
