mod app;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use app::{App, AppOptions};
use clap::Parser;
use serialtest::channel::{PortInfo, available_ports};
use serialtest::config::Config;
use serialtest::prefs::IniPreferences;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "serialtest")]
#[command(about = "A serial terminal with hex view, repeat sending and control items")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "serialtest.ini")]
    config: PathBuf,

    /// Serial port to open, overrides the configuration file
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, overrides the configuration and stored port settings
    #[arg(short, long)]
    baud: Option<u32>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Talk to an in-memory echo channel instead of a serial port
    #[arg(long)]
    loopback: bool,
}

/// Diagnostics go to stderr so they never mix with received data
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_ports(ports: &[PortInfo]) {
    if ports.is_empty() {
        println!("No serial ports found.");
        return;
    }
    println!("{:<20} {:<10} {:<30} {}", "PORT", "VID:PID", "DESCRIPTION", "MANUFACTURER");
    for port in ports {
        let ids = if port.vendor_id != 0 || port.product_id != 0 {
            format!("{:04x}:{:04x}", port.vendor_id, port.product_id)
        } else {
            "-".to_string()
        };
        println!(
            "{:<20} {:<10} {:<30} {}",
            port.name, ids, port.description, port.manufacturer
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    if args.list_ports {
        match available_ports() {
            Ok(ports) => print_ports(&ports),
            Err(e) => {
                eprintln!("Error: cannot enumerate serial ports: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let mut config = match Config::load_or_default(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.serial.port = Some(port);
    }

    init_tracing(&config.logging.level);

    println!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!();
    println!("Serial:");
    if args.loopback {
        println!("  Port: (loopback)");
    } else {
        println!(
            "  Port: {}",
            config.serial.port.as_deref().unwrap_or("(not configured)")
        );
    }
    println!("  Baud: {}", args.baud.unwrap_or(config.serial.baud_rate));
    println!();
    println!("Preferences: {}", config.preferences.path);
    match config.logging.directory {
        Some(ref dir) => println!("Capture directory: {}", dir),
        None => println!("Capture directory: (not configured)"),
    }
    println!();

    let prefs = match IniPreferences::open(&config.preferences.path) {
        Ok(prefs) => prefs,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Set up signal handler for clean shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    let auto_open = args.loopback || config.serial.port.is_some();
    let mut app = App::new(
        config,
        Box::new(prefs),
        AppOptions {
            loopback: args.loopback,
            baud: args.baud,
        },
        running,
    );

    if auto_open {
        if let Err(e) = app.open_port(None) {
            eprintln!("{}", e);
        }
    }
    println!("Type /help for commands.");

    app.run().await;
}
