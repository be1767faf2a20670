//! vadkit command-line entry point.
//!
//! ```text
//! vadkit file --library_path libpv_cobra.so --access_key KEY --wav_path in.wav
//! vadkit mic  --library_path libpv_cobra.so --access_key KEY [--output_path out.wav]
//! vadkit audio-devices
//! vadkit hardware-devices --library_path libpv_cobra.so
//! ```
//!
//! Flags override the settings file; the settings file overrides defaults.

mod commands;
mod display;
mod settings;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use vadkit_core::Profile;

use commands::{EngineOptions, FileJob, MicJob};
use display::OutputMode;
use settings::{default_settings_path, load_settings, normalize_device, Settings};

#[derive(Parser)]
#[command(name = "vadkit", version, about = "Voice activity detection on files and live audio")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the per-user vadkit/settings.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every frame of a 16-bit mono WAV file
    File {
        #[command(flatten)]
        engine: EngineArgs,

        /// WAV file to process
        #[arg(long = "wav_path")]
        wav_path: PathBuf,

        /// Print detections at or above this probability instead of raw values
        #[arg(long)]
        threshold: Option<f32>,

        /// Emit one JSON record per frame plus a summary record
        #[arg(long, conflicts_with = "threshold")]
        json: bool,
    },
    /// Score live microphone audio until Ctrl+C
    Mic {
        #[command(flatten)]
        engine: EngineArgs,

        /// Capture device index from `audio-devices`; -1 selects the default
        #[arg(long = "audio_device_index", allow_negative_numbers = true)]
        audio_device_index: Option<i32>,

        /// Also record the captured audio to this WAV file
        #[arg(long = "output_path")]
        output_path: Option<PathBuf>,

        /// Print detections at or above this probability instead of the meter
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// List audio capture devices
    AudioDevices,
    /// List inference devices supported by the engine module
    HardwareDevices {
        /// Engine module to load
        #[arg(long = "library_path")]
        library_path: Option<PathBuf>,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Engine module to load
    #[arg(long = "library_path")]
    library_path: Option<PathBuf>,

    /// Credential passed to the engine at construction
    #[arg(long = "access_key")]
    access_key: Option<String>,

    /// Inference device for desktop builds (`best`, `cpu`, `gpu:0`, ...)
    #[arg(long)]
    device: Option<String>,

    /// Engine build to load
    #[arg(long, value_enum, default_value_t = ProfileArg::Desktop)]
    profile: ProfileArg,

    /// Scratch arena for the bounded-memory size probe, in bytes
    #[arg(long = "preliminary_memory_size")]
    preliminary_memory_size: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    Desktop,
    Bounded,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Desktop => Profile::Desktop,
            ProfileArg::Bounded => Profile::BoundedMemory,
        }
    }
}

fn library_path(flag: Option<PathBuf>, settings: &Settings) -> Result<PathBuf> {
    match flag.or_else(|| settings.library_path.clone()) {
        Some(path) => Ok(path),
        None => bail!("no engine module given: pass --library_path or set libraryPath in the settings file"),
    }
}

impl EngineArgs {
    fn resolve(self, settings: &Settings) -> Result<EngineOptions> {
        let library_path = library_path(self.library_path, settings)?;
        let access_key = match self.access_key {
            Some(key) => key,
            None => settings
                .access_key
                .clone()
                .context("no access key given: pass --access_key or set accessKey in the settings file")?,
        };
        let device = self
            .device
            .map(|d| normalize_device(&d))
            .unwrap_or_else(|| settings.device.clone());

        Ok(EngineOptions {
            library_path,
            access_key,
            device,
            profile: self.profile.into(),
            preliminary_memory_size: self
                .preliminary_memory_size
                .unwrap_or(settings.preliminary_memory_size)
                .max(settings::MIN_PRELIMINARY_SIZE),
        })
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "vadkit=warn,vadkit_core=warn",
        1 => "vadkit=info,vadkit_core=info",
        2 => "vadkit=debug,vadkit_core=debug",
        _ => "vadkit=trace,vadkit_core=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => load_settings(path, true)?,
        None => load_settings(&default_settings_path(), false)?,
    };

    match cli.command {
        Commands::File {
            engine,
            wav_path,
            threshold,
            json,
        } => {
            let opts = engine.resolve(&settings)?;
            let mode = if json {
                OutputMode::Json
            } else {
                match threshold.or(settings.threshold) {
                    Some(t) => OutputMode::Threshold(t.clamp(0.0, 1.0)),
                    None => OutputMode::Probabilities,
                }
            };
            commands::run_file(&opts, &FileJob { wav_path, mode })
        }
        Commands::Mic {
            engine,
            audio_device_index,
            output_path,
            threshold,
        } => {
            let opts = engine.resolve(&settings)?;
            let audio_device_index = match audio_device_index {
                Some(index) => usize::try_from(index).ok(),
                None => settings.audio_device_index,
            };
            let job = MicJob {
                audio_device_index,
                output_path,
                threshold: threshold.or(settings.threshold).map(|t| t.clamp(0.0, 1.0)),
                meter_alpha: settings.meter_alpha,
            };
            commands::run_mic(&opts, &job)
        }
        Commands::AudioDevices => commands::show_audio_devices(io::stdout().lock()),
        Commands::HardwareDevices { library_path: flag } => {
            let path = library_path(flag, &settings)?;
            let binding = commands::load_binding(&path, Profile::Desktop)?;
            commands::show_hardware_devices(binding.as_ref(), io::stdout().lock())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn negative_device_index_selects_the_default() {
        let cli = Cli::try_parse_from([
            "vadkit",
            "mic",
            "--access_key",
            "k",
            "--audio_device_index",
            "-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Mic {
                audio_device_index, ..
            } => {
                assert_eq!(audio_device_index, Some(-1));
                assert_eq!(usize::try_from(-1i32).ok(), None);
            }
            _ => panic!("expected mic"),
        }
    }

    #[test]
    fn flags_override_settings() {
        let settings = Settings {
            library_path: Some(PathBuf::from("/opt/from-settings.so")),
            access_key: Some("from-settings".into()),
            device: "cpu".into(),
            ..Settings::default()
        };
        let cli = Cli::try_parse_from([
            "vadkit",
            "file",
            "--wav_path",
            "in.wav",
            "--access_key",
            "from-flag",
            "--device",
            "GPU:0",
            "--profile",
            "bounded",
        ])
        .unwrap();
        let Commands::File { engine, .. } = cli.command else {
            panic!("expected file");
        };

        let opts = engine.resolve(&settings).unwrap();
        assert_eq!(opts.library_path, PathBuf::from("/opt/from-settings.so"));
        assert_eq!(opts.access_key, "from-flag");
        assert_eq!(opts.device, "gpu:0");
        assert_eq!(opts.profile, Profile::BoundedMemory);
    }

    #[test]
    fn missing_access_key_is_reported() {
        let settings = Settings {
            library_path: Some(PathBuf::from("lib.so")),
            ..Settings::default()
        };
        let cli = Cli::try_parse_from(["vadkit", "file", "--wav_path", "in.wav"]).unwrap();
        let Commands::File { engine, .. } = cli.command else {
            panic!("expected file");
        };
        let err = engine.resolve(&settings).unwrap_err();
        assert!(err.to_string().contains("--access_key"));
    }

    #[test]
    fn json_and_threshold_conflict() {
        assert!(Cli::try_parse_from([
            "vadkit",
            "file",
            "--wav_path",
            "in.wav",
            "--json",
            "--threshold",
            "0.5"
        ])
        .is_err());
    }
}
