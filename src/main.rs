//! fakekey - Virtual keyboard over Linux uinput
//!
//! Registers a synthetic keyboard with the kernel and types scripted,
//! chorded key sequences through it.

mod config;
mod device;
mod input;
mod keyboard;
mod script;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use device::{Timing, VirtualDevice};
use input::{KeyCode, RecordingBackend, UinputBackend};
use keyboard::{EmissionOptions, KeyActuator};
use script::{Script, ScriptPlayer};

/// fakekey - Virtual keyboard over Linux uinput
#[derive(Parser)]
#[command(name = "fakekey")]
#[command(version = "0.1.0")]
#[command(about = "Type scripted key sequences through a virtual uinput keyboard", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the device and play a script through it
    Play {
        /// Built-in script (sentence, dead-key, digits) or a TOML script file
        #[arg(default_value = "sentence")]
        script: String,

        /// Record the event stream instead of touching the uinput node
        #[arg(long)]
        dry_run: bool,

        /// Sleep the step interval after every key action
        #[arg(long)]
        sleep: bool,

        /// Extra delay after every script step (ms)
        #[arg(long, default_value_t = 0)]
        step_delay_ms: u64,
    },

    /// Click one key, optionally chorded with modifiers
    Click {
        /// Key name, e.g. KEY_A or a
        key: String,

        /// Modifier to hold (shift, right-alt, ctrl, meta, ...)
        #[arg(short, long = "modifier")]
        modifiers: Vec<String>,

        /// Record the event stream instead of touching the uinput node
        #[arg(long)]
        dry_run: bool,
    },

    /// List the keys the device declares
    Keys,

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show system information
    Info,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    match cli.command {
        Commands::Play {
            script,
            dry_run,
            sleep,
            step_delay_ms,
        } => {
            let script = Script::resolve(&script)?;
            let mut player = ScriptPlayer::new(Duration::from_millis(step_delay_ms));
            if sleep {
                player = player.with_options(EmissionOptions::SLEEP | EmissionOptions::LOG);
            }
            play(&config, &script, player, dry_run)?;
        }
        Commands::Click {
            key,
            modifiers,
            dry_run,
        } => {
            let code = KeyCode::from_name(&key)
                .ok_or_else(|| anyhow::anyhow!("Unknown key: {}", key))?;
            let modifiers = script::parse_modifiers(modifiers.as_slice())?;
            let script = Script::new("click").chord(code, modifiers);
            play(&config, &script, ScriptPlayer::default(), dry_run)?;
        }
        Commands::Keys => {
            let registrar = config.capabilities()?;
            for key in registrar.staged().keys() {
                println!("{:>4}  {}", key.code(), key);
            }
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_system_info(&config);
        }
    }

    Ok(())
}

/// Play a script on a real device, or on a recording one for dry runs
fn play(config: &Config, script: &Script, player: ScriptPlayer, dry_run: bool) -> anyhow::Result<()> {
    if dry_run {
        let backend = RecordingBackend::with_node(config.device.node.clone());
        let journal = backend.journal();
        let played = run_session(backend, config, Timing::immediate(), script, player)?;

        let events = journal.events();
        for event in &events {
            println!("{}", event);
        }
        println!(
            "\n'{}': {} steps, {} events (dry run)",
            script.name(),
            played,
            events.len()
        );
        return Ok(());
    }

    let played = run_live(config, script, player)?;
    println!("'{}': {} steps played", script.name(), played);
    Ok(())
}

#[cfg(target_os = "linux")]
fn run_live(config: &Config, script: &Script, player: ScriptPlayer) -> anyhow::Result<usize> {
    let backend = input::LinuxUinput::new(config.device.node.clone());
    run_session(backend, config, config.timing(), script, player)
}

#[cfg(not(target_os = "linux"))]
fn run_live(_config: &Config, _script: &Script, _player: ScriptPlayer) -> anyhow::Result<usize> {
    anyhow::bail!(
        "uinput is not available on {}; use --dry-run",
        input::platform_name()
    )
}

/// Create the device, play the script and always tear the device down
///
/// A playback error takes precedence over a teardown error.
fn run_session<B: UinputBackend>(
    backend: B,
    config: &Config,
    timing: Timing,
    script: &Script,
    player: ScriptPlayer,
) -> anyhow::Result<usize> {
    let mut device = VirtualDevice::new(backend, config.identity(), timing);
    device.configure(config.capabilities()?)?;
    device.create()?;

    let played = player.play(&mut KeyActuator::new(&mut device), script);
    let destroyed = device.destroy();

    let played = played?;
    destroyed?;
    Ok(played)
}

/// Print system information
fn print_system_info(config: &Config) {
    println!("fakekey System Information");
    println!("==========================\n");

    println!("Platform: {}", input::platform_name());
    println!("uinput backend: {}", if input::has_uinput() { "yes" } else { "no" });

    #[cfg(target_os = "linux")]
    {
        let node = &config.device.node;
        let present = input::LinuxUinput::is_available(node);
        println!("Node: {} ({})", node.display(), if present { "present" } else { "missing" });
        println!("\nLinux Requirements:");
        println!("  - uinput module must be loaded: sudo modprobe uinput");
        println!("  - User needs write access to the node (root, or a udev rule for the 'input' group)");
    }

    let identity = config.identity();
    println!("\nDevice: '{}'", identity.name);
    println!(
        "  bus {:#04x}, vendor {:#06x}, product {:#06x}, version {}",
        identity.bus_type, identity.vendor, identity.product, identity.version
    );

    let timing = config.timing();
    println!(
        "  settle {:?}, drain {:?}, step {:?}",
        timing.settle, timing.drain, timing.step
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use input::{DeviceError, FailurePlan, RecordedCall};

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["fakekey", "info"]);
        assert!(cli.is_ok());

        let cli = Cli::try_parse_from(["fakekey", "-v", "play", "dead-key", "--dry-run"]).unwrap();
        match cli.command {
            Commands::Play {
                script, dry_run, ..
            } => {
                assert_eq!(script, "dead-key");
                assert!(dry_run);
            }
            _ => panic!("expected play"),
        }
        assert!(cli.verbose);

        let cli =
            Cli::try_parse_from(["fakekey", "click", "KEY_A", "-m", "shift", "-m", "alt"]).unwrap();
        match cli.command {
            Commands::Click { key, modifiers, .. } => {
                assert_eq!(key, "KEY_A");
                assert_eq!(modifiers, vec!["shift", "alt"]);
            }
            _ => panic!("expected click"),
        }

        assert!(Cli::try_parse_from(["fakekey"]).is_err());
    }

    #[test]
    fn test_play_defaults_to_sentence() {
        let cli = Cli::try_parse_from(["fakekey", "play"]).unwrap();
        match cli.command {
            Commands::Play {
                script,
                dry_run,
                sleep,
                step_delay_ms,
            } => {
                assert_eq!(script, "sentence");
                assert!(!dry_run && !sleep);
                assert_eq!(step_delay_ms, 0);
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn test_session_lifecycle() {
        let backend = RecordingBackend::new();
        let journal = backend.journal();
        let played = run_session(
            backend,
            &Config::default(),
            Timing::immediate(),
            &Script::sentence(),
            ScriptPlayer::default(),
        )
        .unwrap();

        assert_eq!(played, 14);
        assert_eq!(journal.events().len(), 14 * 4);
        let calls = journal.calls();
        assert_eq!(calls.first(), Some(&RecordedCall::Open));
        assert!(calls.contains(&RecordedCall::Create));
        assert_eq!(
            &calls[calls.len() - 2..],
            &[RecordedCall::Destroy, RecordedCall::Close]
        );
    }

    #[test]
    fn test_session_destroys_after_failure() {
        let backend = RecordingBackend::new().with_failures(FailurePlan {
            short_write_at: Some(3),
            ..Default::default()
        });
        let journal = backend.journal();
        let err = run_session(
            backend,
            &Config::default(),
            Timing::immediate(),
            &Script::sentence(),
            ScriptPlayer::default(),
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeviceError>(),
            Some(DeviceError::PartialWrite { .. })
        ));
        assert_eq!(journal.events().len(), 3);
        assert!(journal.calls().contains(&RecordedCall::Destroy));
    }
}
