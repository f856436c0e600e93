//! suns - SunSpec device scanner
//!
//! Finds the SunSpec signature on a Modbus device, walks its model chain and
//! prints every decoded model. The same engine can scan an in-process
//! register image built from data blocks, which is how model definitions are
//! checked without hardware.

mod output;
mod transport;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::*;
use common::logging::{self, LogConfig};
use common::{AppConfig, OutputFormat, TransportKind};
use suns_model::{
    build_register_table, load_definitions, DataSource, Definitions, ModelRegistry,
    RegisterTransport, ScanEvent, Scanner,
};
use tracing::{debug, info, warn};

use crate::output::Renderer;
use crate::transport::ModbusTransport;

#[derive(Parser)]
#[command(name = "suns")]
#[command(about = "SunSpec device scanner and register map tool")]
#[command(long_about = "SunSpec device scanner and register map tool

Commands:
  scan        Discover and decode the models of a Modbus device
  simulate    Scan the register image built from data blocks
  map         Print the register image built from data blocks
  export      Print the loaded model descriptions

Examples:
  suns -m models.yaml scan --host 192.168.1.20
  suns -m models.yaml scan -t rtu --serial /dev/ttyUSB0 --baud 19200 -f csv
  suns -m models.yaml -m device.yaml simulate --base 40001
  suns -m models.yaml export yaml")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Model definition files, added after the configured ones
    #[arg(short = 'm', long = "models", global = true)]
    models: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and decode the models of a Modbus device
    Scan {
        #[arg(short = 't', long, value_enum)]
        transport: Option<TransportKind>,

        /// TCP host
        #[arg(long)]
        host: Option<String>,

        /// TCP port
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Serial device for RTU
        #[arg(long)]
        serial: Option<String>,

        #[arg(long)]
        baud: Option<u32>,

        /// Modbus unit address
        #[arg(short = 's', long)]
        slave: Option<u8>,

        #[arg(long)]
        timeout_ms: Option<u64>,

        /// 1-based registers probed for the signature
        #[arg(short = 'b', long = "base", value_delimiter = ',')]
        base: Vec<u16>,

        #[arg(short = 'f', long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Scan the register image built from data blocks
    Simulate {
        /// 1-based register of the signature
        #[arg(short = 'b', long, default_value_t = 40001)]
        base: u16,

        #[arg(short = 'f', long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Print the register image built from data blocks
    Map {
        #[arg(short = 'b', long, default_value_t = 40001)]
        base: u16,
    },

    /// Print the loaded model descriptions with resolved offsets
    Export {
        #[arg(value_enum, default_value_t = ExportFormat::Yaml)]
        format: ExportFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Yaml,
}

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(true) => {},
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        },
    }
}

/// Returns `false` when a scan stopped before the end marker
fn run(cli: Cli) -> Result<bool> {
    let mut config = common::load_config(cli.config.as_deref())?;
    config.models.extend(cli.models.iter().cloned());

    let level = if cli.verbose == 0 && !cli.quiet {
        config.log_level.clone()
    } else {
        logging::level_for_verbosity(cli.verbose, cli.quiet).to_string()
    };
    logging::init_with_config(LogConfig {
        level,
        ansi: !cli.no_color,
        log_file: cli.log_file.clone(),
    })?;

    let (registry, data) = load_models(&config)?;
    let dump = cli.verbose > 0;

    match cli.command {
        Commands::Scan {
            transport,
            host,
            port,
            serial,
            baud,
            slave,
            timeout_ms,
            base,
            format,
        } => {
            if let Some(transport) = transport {
                config.transport = transport;
            }
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(serial) = serial {
                config.serial = serial;
            }
            if let Some(baud) = baud {
                config.baud = baud;
            }
            if let Some(slave) = slave {
                config.slave = slave;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.timeout_ms = timeout_ms;
            }
            if !base.is_empty() {
                config.candidates = base;
            }
            if let Some(format) = format {
                config.output = format;
            }
            config.validate()?;

            let transport = ModbusTransport::connect(&config)?;
            let scanner = Scanner::new(&registry, transport).with_candidates(config.candidates);
            run_scan(scanner, config.output, dump)
        },
        Commands::Simulate { base, format } => {
            let table = build_register_table(&registry, base, &data)
                .context("Failed to build register image")?;
            info!("Simulating {} registers at base {}", table.len(), base);
            let scanner = Scanner::new(&registry, table).with_candidates(vec![base]);
            run_scan(scanner, format.unwrap_or(config.output), dump)
        },
        Commands::Map { base } => {
            let table = build_register_table(&registry, base, &data)
                .context("Failed to build register image")?;
            let mut out = BufWriter::new(io::stdout().lock());
            output::write_register_map(&mut out, &table)?;
            out.flush()?;
            Ok(true)
        },
        Commands::Export { format } => {
            let out = BufWriter::new(io::stdout().lock());
            match format {
                ExportFormat::Csv => output::export_csv(out, &registry)?,
                ExportFormat::Yaml => output::export_yaml(out, &registry)?,
            }
            Ok(true)
        },
    }
}

/// Load every configured definition file into one resolved registry
fn load_models(config: &AppConfig) -> Result<(ModelRegistry, Vec<DataSource>)> {
    if config.models.is_empty() {
        bail!("No model definitions given; pass --models or set `models` in the config file");
    }

    let mut definitions = Definitions::default();
    for path in &config.models {
        let loaded = load_definitions(path)
            .with_context(|| format!("Failed to load model definitions from {}", path.display()))?;
        definitions.merge(loaded);
    }
    for error in &definitions.errors {
        warn!("{}", error);
    }

    let Definitions { models, data, .. } = definitions;
    let registry = models.build().context("Failed to resolve model definitions")?;
    debug!("Registry holds {} models", registry.len());
    Ok((registry, data))
}

/// Render models as the scanner finds them. Output already written is kept
/// when the traversal fails part way.
fn run_scan<T: RegisterTransport>(
    mut scanner: Scanner<'_, T>,
    format: OutputFormat,
    dump: bool,
) -> Result<bool> {
    let mut renderer = Renderer::new(format, BufWriter::new(io::stdout().lock()));
    let mut render_error = None;
    let mut found = 0usize;

    let outcome = scanner.scan_with(|event| {
        if render_error.is_some() {
            return;
        }
        found += 1;
        let rendered = match &event {
            ScanEvent::Model { register, dataset } => renderer.dataset(*register, dataset),
            ScanEvent::Unknown {
                register,
                model_id,
                length,
                bytes,
            } => renderer.unknown(*register, *model_id, *length, bytes, dump),
        };
        if let Err(e) = rendered {
            render_error = Some(e);
        }
    });

    renderer.finish()?;
    if let Some(e) = render_error {
        return Err(e.context("Failed to write output"));
    }

    match outcome {
        Ok(base) => {
            eprintln!(
                "{} {} models from base register {}",
                "Scan complete:".green(),
                found,
                base
            );
            Ok(true)
        },
        Err(e) => {
            eprintln!(
                "{} {} after {} models",
                "Scan failed:".red().bold(),
                e,
                found
            );
            Ok(false)
        },
    }
}
