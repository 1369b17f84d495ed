use clap::{Parser, Subcommand};
use futures::StreamExt;
use portkit::config::{Config, ConfigLoader};
use portkit::port::{
    list_ports, DataBits, Parity, PortSettings, SerialPort, SerialPortFactory, StopBits,
};
use std::io::Write as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Terminal monitor for serial ports.",
    long_about = "Lists serial devices and opens a port through the platform backend, printing received frames and sending each line typed on stdin."
)]
struct Args {
    /// Path to a portkit.toml configuration file.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial devices present on this system.
    List {
        /// Print the list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Open a port, print what arrives and send stdin lines.
    Monitor(MonitorArgs),
}

#[derive(clap::Args, Debug)]
struct MonitorArgs {
    /// Port name or alias. Defaults to the configured port, then a per-OS default.
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Data bits (5-8).
    #[arg(long)]
    data_bits: Option<u8>,

    /// Stop bits (1 or 2).
    #[arg(long)]
    stop_bits: Option<u8>,

    /// Parity: none, odd, even, mark or space.
    #[arg(long)]
    parity: Option<Parity>,

    /// Print received frames as hex instead of text.
    #[arg(long)]
    hex: bool,

    /// Send lines without a trailing newline.
    #[arg(long)]
    raw: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => ConfigLoader::load_from(path)?.into_config(),
        None => match ConfigLoader::load() {
            Ok(loader) => loader.into_config(),
            Err(e) => {
                eprintln!("Warning: Failed to load config, using defaults: {e}");
                ConfigLoader::with_defaults().into_config()
            }
        },
    };
    portkit::logging::init_tracing(&config.logging)?;

    match args.command {
        Command::List { json } => run_list(json),
        Command::Monitor(monitor) => run_monitor(&config, monitor).await,
    }
}

fn run_list(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ports = list_ports()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports detected on this system");
        return Ok(());
    }
    for port in ports {
        match port.description {
            Some(description) => println!("{}\t{}\t{}", port.name, port.kind, description),
            None => println!("{}\t{}", port.name, port.kind),
        }
    }
    Ok(())
}

async fn run_monitor(
    config: &Config,
    args: MonitorArgs,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let port_name = match args.port.or_else(|| config.serial.default_port.clone()) {
        Some(name) => config.serial.resolve_port(&name),
        None => default_port_name()?.to_string(),
    };
    let settings =
        monitor_settings(config, args.baud, args.data_bits, args.stop_bits, args.parity)?;

    let mut port = SerialPortFactory::from_config(&config.serial);
    port.open(&port_name, settings).await?;
    info!("Monitoring {} at {} baud (Ctrl-C to quit)", port_name, settings.baud_rate);

    let mut frames = port.read();
    let hex = args.hex;
    let printer = tokio::spawn(async move {
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(bytes) => print_frame(&bytes, hex),
                Err(e) => {
                    warn!("Read stopped: {}", e);
                    break;
                }
            }
        }
    });

    let result = pump_stdin(port.as_mut(), args.raw).await;

    if let Err(e) = port.close().await {
        warn!("Failed to close {}: {}", port_name, e);
    }
    join_printer(printer, &port_name).await;
    result
}

/// Forward stdin lines to the port until EOF or Ctrl-C.
async fn pump_stdin(
    port: &mut dyn SerialPort,
    raw: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(mut line) = line? else {
                    return Ok(());
                };
                if !raw {
                    line.push('\n');
                }
                port.write(line.as_bytes()).await?;
            }
            _ = &mut shutdown => {
                eprintln!("\nSignal received, closing port...");
                return Ok(());
            }
        }
    }
}

/// Wait for the frame printer, reporting a panic or cancellation.
///
/// Returns whether it finished cleanly.
async fn join_printer(printer: tokio::task::JoinHandle<()>, port_name: &str) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            warn!("Frame printer for {} ended abnormally: {}", port_name, e);
            false
        }
    }
}

fn monitor_settings(
    config: &Config,
    baud: Option<u32>,
    data_bits: Option<u8>,
    stop_bits: Option<u8>,
    parity: Option<Parity>,
) -> Result<PortSettings, portkit::PortError> {
    let mut settings = config.serial.port_settings()?;
    if let Some(baud) = baud {
        settings.baud_rate = baud;
    }
    if let Some(bits) = data_bits {
        settings.data_bits = DataBits::try_from(bits)?;
    }
    if let Some(bits) = stop_bits {
        settings.stop_bits = StopBits::try_from(bits)?;
    }
    if let Some(parity) = parity {
        settings.parity = parity;
    }
    settings.validate()?;
    Ok(settings)
}

/// Port to fall back on when neither the command line nor config names one.
fn default_port_name() -> Result<&'static str, portkit::PortError> {
    if cfg!(target_os = "windows") {
        Ok("COM4")
    } else if cfg!(any(target_os = "linux", target_os = "android")) {
        Ok("/dev/ttyWK0")
    } else {
        Err(portkit::PortError::new(format!(
            "Unsupported operating system: {}; pass a port name explicitly",
            std::env::consts::OS
        )))
    }
}

fn print_frame(bytes: &[u8], hex: bool) {
    let mut stdout = std::io::stdout().lock();
    if hex {
        let rendered: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
        let _ = writeln!(stdout, "{}", rendered.join(" "));
    } else {
        let _ = write!(stdout, "{}", String::from_utf8_lossy(bytes));
    }
    let _ = stdout.flush();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_printer_reports_panic() {
        let printer = tokio::spawn(async { panic!("printer blew up") });
        assert!(!join_printer(printer, "LOOP0").await);
    }

    #[tokio::test]
    async fn test_join_printer_clean_exit() {
        let printer = tokio::spawn(async {});
        assert!(join_printer(printer, "LOOP0").await);
    }

    #[test]
    fn test_monitor_settings_overrides_config() {
        let settings = monitor_settings(
            &Config::default(),
            Some(115_200),
            Some(7),
            Some(2),
            Some(Parity::Even),
        )
        .unwrap();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.data_bits, DataBits::Seven);
        assert_eq!(settings.stop_bits, StopBits::Two);
        assert_eq!(settings.parity, Parity::Even);
    }

    #[test]
    fn test_monitor_settings_rejects_zero_baud() {
        assert!(monitor_settings(&Config::default(), Some(0), None, None, None).is_err());
    }
}
