//! CLI tool for dashnet

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand, ValueEnum};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "dashnet")]
#[command(about = "dashnet: live TCP/UDP connections per process, with DNS, service names and regex filtering", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: ~/.config/dashnet/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Refresh interval in seconds
    #[arg(short, long, global = true)]
    interval: Option<f64>,

    /// Show IP addresses instead of hostnames
    #[arg(long, global = true)]
    no_dns: bool,

    /// Show port numbers instead of service names
    #[arg(long, global = true)]
    no_service: bool,

    /// Start in the connection list view
    #[arg(short, long)]
    list: bool,

    /// Write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Launch the interactive dashboard (default)
    Tui,
    /// Load one snapshot and print its views
    Snapshot {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[cfg(feature = "cli")]
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[cfg(feature = "cli")]
#[derive(serde::Serialize)]
struct Report {
    by_process: Vec<dashnet::views::ProcessTraffic>,
    by_remote_address: Vec<dashnet::views::AddressTraffic>,
    by_local_address: Vec<dashnet::views::AddressTraffic>,
    connections: Vec<dashnet::views::ConnectionRow>,
}

#[cfg(feature = "cli")]
fn load_config(cli: &Cli) -> Result<dashnet::Config, Box<dyn std::error::Error>> {
    use dashnet::toggle::ViewMode;
    use dashnet::Config;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(secs) = cli.interval {
        if !(secs > 0.0) {
            return Err("refresh interval must be greater than zero".into());
        }
        config.general.refresh_interval_ms = (secs * 1000.0).round().max(1.0) as u64;
    }
    if cli.no_dns {
        config.display.resolve_dns = false;
    }
    if cli.no_service {
        config.display.resolve_service = false;
    }
    if cli.list {
        config.display.start_view = ViewMode::List;
    }

    Ok(config)
}

#[cfg(feature = "cli")]
fn init_logging(cli: &Cli, interactive: bool) -> Result<(), Box<dyn std::error::Error>> {
    use env_logger::{Builder, Env, Target};

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            Builder::from_env(Env::default().default_filter_or("info"))
                .target(Target::Pipe(Box::new(file)))
                .init();
        }
        // stderr belongs to the dashboard
        None if interactive => {}
        None => env_logger::init(),
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn print_table(table: &dashnet::render::Table) {
    let widths = table.column_widths();
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", table.title);
    println!("{}", line(&table.headers));
    for row in &table.rows {
        println!("{}", line(row));
    }
    println!();
}

#[cfg(feature = "cli")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use dashnet::snapshot::SnapshotLoader;
    use dashnet::views::{self, TextOpts};

    let cli = Cli::parse();
    let interactive = !matches!(cli.command, Some(Commands::Snapshot { .. }));
    init_logging(&cli, interactive)?;

    let config = load_config(&cli)?;
    let loader = SnapshotLoader::system(&config);

    match &cli.command {
        None | Some(Commands::Tui) => {
            if let Err(e) = dashnet::tui::run(&config, loader) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Snapshot { format }) => {
            let snapshot = loader.load()?;
            match format {
                Format::Json => {
                    let report = Report {
                        by_process: views::traffic_by_process(&snapshot),
                        by_remote_address: views::traffic_by_remote_address(&snapshot),
                        by_local_address: views::traffic_by_local_address(&snapshot),
                        connections: views::all_connections(&snapshot),
                    };
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Format::Text => {
                    let opts = TextOpts {
                        resolve_dns: config.display.resolve_dns,
                        resolve_service: config.display.resolve_service,
                    };
                    print_table(&views::process_table(&snapshot));
                    print_table(&views::remote_address_table(&snapshot, opts));
                    print_table(&views::local_address_table(&snapshot, opts));
                    print_table(&views::connections_table(&snapshot, opts));
                }
            }
        }
    }

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
