use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use smx_lib::commands::Rgb;
use smx_lib::config::StageConfig;
use smx_lib::constants::LIGHT_STRIP_LEDS;
use smx_lib::sensors::{PanelTestMode, SensorTestMode};
use smx_lib::transport::{self, UsbTransport};
use smx_lib::{SerialOutcome, SmxStage};

#[derive(Parser)]
#[command(name = "smx", about = "Talk to StepManiaX stages", version)]
struct Cli {
    /// USB serial number of the stage to use (defaults to the first found)
    #[arg(long, global = true)]
    serial: Option<String>,

    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected stages
    List,
    /// Show device info for one stage
    Info,
    /// Dump the stage configuration
    GetConfig,
    /// Restore the factory configuration and default lights
    FactoryReset,
    /// Re-tare all panel sensors
    Recalibrate,
    /// Set the whole platform light strip to one color
    SetLights {
        /// Color as RRGGBB hex
        color: String,
    },
    /// Read one round of sensor diagnostics
    TestData {
        /// One of: uncalibrated, calibrated, noise, tare
        mode: String,
    },
    /// Write the device serial number (ignored by stages that have one)
    SetSerial {
        /// 16 bytes as 32 hex characters
        serial: String,
    },
    /// Switch panels between button events and pressure diagnostics
    PanelTest {
        /// "on" or "off"
        state: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::List = cli.command {
        for device in transport::list_stages()? {
            println!(
                "bus {:03} addr {:03} serial {}",
                device.bus_number(),
                device.device_address(),
                device.serial_number().unwrap_or("<none>")
            );
        }
        return Ok(());
    }

    let stage = open_stage(cli.serial.as_deref()).await?;

    match cli.command {
        Commands::List => unreachable!("handled above"),
        Commands::Info => {
            let info = stage.get_device_info().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Player:   {}", info.player);
                println!("Serial:   {}", info.serial);
                println!("Firmware: {}", info.firmware_version);
            }
        }
        Commands::GetConfig => {
            let config = stage.get_stage_config().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_config(&config);
            }
        }
        Commands::FactoryReset => {
            stage.factory_reset().await?;
            println!("Factory reset complete");
        }
        Commands::Recalibrate => {
            stage.force_recalibration().await?;
            println!("Recalibration requested");
        }
        Commands::SetLights { color } => {
            let rgb = parse_color(&color)?;
            stage.set_light_strip(&[rgb; LIGHT_STRIP_LEDS]).await?;
            println!("Light strip set to #{color}");
        }
        Commands::TestData { mode } => {
            let mode = parse_test_mode(&mode)?;
            let data = stage.get_sensor_test_data(mode).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                for (panel, levels) in data.sensor_level.iter().enumerate() {
                    let status = if data.have_data_from_panel[panel] {
                        format!("{levels:?}")
                    } else {
                        "no response".to_string()
                    };
                    println!("panel {panel}: {status}");
                }
            }
        }
        Commands::SetSerial { serial } => {
            let bytes = hex::decode(&serial).context("serial must be hex")?;
            match stage.set_serial_number(&bytes).await? {
                SerialOutcome::Applied => println!("Serial number written"),
                SerialOutcome::AlreadySet { current } => {
                    println!("Stage already has serial {current}; kept unchanged")
                }
            }
        }
        Commands::PanelTest { state } => {
            let mode = match state.as_str() {
                "on" => PanelTestMode::PressureTest,
                "off" => PanelTestMode::Off,
                other => bail!("panel test state must be \"on\" or \"off\", got {other:?}"),
            };
            stage.set_panel_test_mode(mode).await?;
            println!("Panel test mode: {state}");
        }
    }

    Ok(())
}

async fn open_stage(serial: Option<&str>) -> anyhow::Result<SmxStage<UsbTransport>> {
    let stage = match serial {
        Some(serial) => SmxStage::open_serial(serial).await?,
        None => SmxStage::open().await?,
    };
    Ok(stage)
}

fn parse_color(hex_color: &str) -> anyhow::Result<Rgb> {
    let bytes = hex::decode(hex_color).context("color must be RRGGBB hex")?;
    match bytes.as_slice() {
        [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
        _ => bail!("color must be exactly 3 bytes of hex, got {}", bytes.len()),
    }
}

fn parse_test_mode(mode: &str) -> anyhow::Result<SensorTestMode> {
    Ok(match mode {
        "uncalibrated" => SensorTestMode::UncalibratedValues,
        "calibrated" => SensorTestMode::CalibratedValues,
        "noise" => SensorTestMode::Noise,
        "tare" => SensorTestMode::Tare,
        other => bail!("unknown sensor test mode {other:?}"),
    })
}

fn print_config(config: &StageConfig) {
    println!("Config version:  {}", config.config_version);
    println!("Master version:  {}", config.master_version);
    println!("Flags:           {:#04x}", config.flags);
    println!("Auto-light mask: {:#06x}", config.auto_light_panel_mask);
    println!(
        "Platform strip:  #{}",
        hex::encode(&config.platform_strip_color)
    );
    for (panel, settings) in config.panel_settings.iter().enumerate() {
        println!(
            "panel {panel}: fsr low {:?} high {:?}",
            settings.fsr_low_threshold, settings.fsr_high_threshold
        );
    }
}
