//! Command line arguments for the glovecap binary.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Top-level arguments.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct GloveArgs {
    #[command(subcommand)]
    /// Which task to perform
    pub command: CommandTask,

    /// RON file overriding the default protocol and queue settings
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
}

/// The tasks glovecap can perform.
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// List the serial ports on this machine
    Ports,

    /// Load a sensor table and summarize it
    Inspect(InspectCommand),

    /// Read frames from the glove
    Capture(CaptureCommand),
}

/// Arguments for `glovecap inspect`.
#[derive(Debug, Args, Clone)]
pub struct InspectCommand {
    /// CSV file mapping sensor ids to frame offsets
    #[arg(short = 's', long = "sensor-map")]
    pub sensor_map: PathBuf,
}

/// Arguments for `glovecap capture`.
#[derive(Debug, Args, Clone)]
pub struct CaptureCommand {
    /// CSV file mapping sensor ids to frame offsets
    #[arg(short = 's', long = "sensor-map")]
    pub sensor_map: PathBuf,

    /// Serial device to read from. Asks interactively when left out
    #[arg(short = 'p', long = "port")]
    pub port: Option<PathBuf>,

    /// Serial line speed, overriding the config file
    #[arg(short = 'b', long = "baud")]
    pub baud: Option<u32>,

    /// Stop after this many frames
    #[arg(short = 'n', long = "frames")]
    pub frames: Option<u64>,

    /// Log progress instead of drawing a status screen
    #[arg(long = "headless")]
    pub headless: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_capture() {
        let args = GloveArgs::parse_from([
            "glovecap",
            "--config",
            "glove.ron",
            "capture",
            "-s",
            "map.csv",
            "--port",
            "/dev/ttyACM0",
            "--frames",
            "200",
            "--headless",
        ]);

        assert_eq!(args.config, Some(PathBuf::from("glove.ron")));
        match args.command {
            CommandTask::Capture(cmd) => {
                assert_eq!(cmd.sensor_map, PathBuf::from("map.csv"));
                assert_eq!(cmd.port, Some(PathBuf::from("/dev/ttyACM0")));
                assert_eq!(cmd.frames, Some(200));
                assert_eq!(cmd.baud, None);
                assert!(cmd.headless);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn sensor_map_is_required() {
        assert!(GloveArgs::try_parse_from(["glovecap", "inspect"]).is_err());
        assert!(GloveArgs::try_parse_from(["glovecap", "ports"]).is_ok());
    }
}
