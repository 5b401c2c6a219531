//! sparkbus CLI
//!
//! Bench diagnostics for Spark controllers: print the arbitration-ID
//! table, watch a device's telemetry, or drive a setpoint with the
//! heartbeat running.

use std::time::Duration;

use clap::{Parser, Subcommand};

use sparkbus::codec::arbitration::ArbitrationId;
use sparkbus::prelude::*;
use sparkbus::MessageType;

/// Spark CAN driver utilities
#[derive(Parser, Debug)]
#[command(name = "sparkbus", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the arbitration-ID table
    IdTable {
        /// Device ID to render the table for
        #[arg(long, default_value_t = 0)]
        id: u8,
    },

    /// Watch a device's telemetry
    Monitor {
        /// CAN interface name
        #[arg(long, default_value = "can0")]
        interface: String,

        /// Device ID (0-63)
        #[arg(long)]
        id: u8,

        /// Treat the device as a SPARK Flex instead of a SPARK MAX
        #[arg(long)]
        flex: bool,
    },

    /// Drive a velocity setpoint with the heartbeat running
    Drive {
        /// CAN interface name
        #[arg(long, default_value = "can0")]
        interface: String,

        /// Device ID (0-63)
        #[arg(long)]
        id: u8,

        /// Treat the device as a SPARK Flex instead of a SPARK MAX
        #[arg(long)]
        flex: bool,

        /// Velocity setpoint in RPM
        #[arg(long)]
        velocity: f64,

        /// How long to drive before commanding zero, in seconds
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sparkbus=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::IdTable { id } => {
            id_table(id);
            Ok(())
        }
        Commands::Monitor {
            interface,
            id,
            flex,
        } => monitor(&interface, id, flex).await,
        Commands::Drive {
            interface,
            id,
            flex,
            velocity,
            seconds,
        } => drive(&interface, id, flex, velocity, seconds).await,
    }
}

fn id_table(device_id: u8) {
    println!("Arbitration IDs for device {}:", device_id);
    println!();
    for message in MessageType::ALL {
        let raw = ArbitrationId::encode(DeviceClass::Max, message, device_id);
        println!(
            "  0x{:08X}  api 0x{:03X}  {}",
            raw,
            message.api(),
            message.description()
        );
    }
}

async fn open_device(interface: &str, id: u8, flex: bool) -> Result<SparkDevice> {
    let class = if flex {
        DeviceClass::Flex
    } else {
        DeviceClass::Max
    };
    SparkDevice::open(class, interface, id).await
}

async fn monitor(interface: &str, id: u8, flex: bool) -> Result<()> {
    let device = open_device(interface, id, flex).await?;
    println!(
        "Monitoring {} {} on {} (Ctrl+C to stop)",
        device.device_class(),
        id,
        interface
    );

    let mut interval = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = interval.tick() => {
                print_row(&device);
            }
        }
    }

    let diag = device.diagnostics();
    println!(
        "\nrx={} ignored={} decode_err={} send_err={}",
        diag.frames_received, diag.frames_ignored, diag.decode_errors, diag.send_errors
    );
    Ok(())
}

fn print_row(device: &SparkDevice) {
    let fmt = |r: Result<f64>| match r {
        Ok(v) => format!("{:8.2}", v),
        Err(_) => "   --   ".to_string(),
    };
    println!(
        "vel={} RPM  pos={} rot  abs={} rot  vbus={} V  temp={} degC",
        fmt(device.velocity()),
        fmt(device.position()),
        fmt(device.absolute_encoder_position()),
        fmt(device.bus_voltage()),
        fmt(device.motor_temperature()),
    );
}

async fn drive(interface: &str, id: u8, flex: bool, velocity: f64, seconds: u64) -> Result<()> {
    let device = open_device(interface, id, flex).await?;
    device.heartbeat(true).await;

    println!("Driving device {} at {} RPM for {}s", id, velocity, seconds);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    let mut interval = tokio::time::interval(Duration::from_millis(20));
    while tokio::time::Instant::now() < deadline {
        interval.tick().await;
        device.set_velocity(velocity)?;
    }

    device.set_velocity(0.0)?;
    device.heartbeat(false).await;
    print_row(&device);
    Ok(())
}
