use std::path::PathBuf;

use clap::Parser;

use crate::camera::CameraSetting;

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// TOML configuration file [default: config/default.toml]
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub debug: bool,

    #[arg(long)]
    pub log_file: Option<String>,

    #[arg(long)]
    pub address: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub topic: Option<String>,

    /// Image messages per second
    #[arg(long)]
    pub publish_rate: Option<f64>,

    #[arg(long)]
    pub buffer_count: Option<i64>,

    /// Wait for the next image, 0 waits forever
    #[arg(long)]
    pub grab_timeout_ms: Option<u64>,

    /// Extra camera setting, e.g. float:ExposureTime=5000 (repeatable)
    #[arg(long = "set", value_name = "KIND:NAME=VALUE")]
    pub settings: Vec<CameraSetting>,

    /// Stop after this many frames
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// Save the last frame to this path on exit
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_parse_arguments() {
        let args = CliArgs::try_parse_from([
            "spinnaker_camera",
            "--debug",
            "--port",
            "6001",
            "--set",
            "enum:ExposureAuto=Off",
            "--set",
            "float:ExposureTime=4000",
            "--max-frames",
            "10",
        ])
        .unwrap();

        assert!(args.debug);
        assert_eq!(args.port, Some(6001));
        assert_eq!(args.max_frames, Some(10));
        assert_eq!(
            args.settings,
            vec![
                CameraSetting::enumeration("ExposureAuto", "Off"),
                CameraSetting::float("ExposureTime", 4000.0),
            ]
        );
        assert!(args.config.is_none());
    }

    #[test]
    fn test_invalid_setting_is_rejected() {
        let result = CliArgs::try_parse_from(["spinnaker_camera", "--set", "ExposureTime=4000"]);
        assert!(result.is_err());
    }
}
