use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use airplot::cli::{self, OutputFormat, ResolveArgs};
use airplot::config::{self, AirplotConfig};
use airplot::pipeline::Endpoint;
use airplot::web;

#[derive(Debug, Parser)]
#[command(name = "airplot")]
#[command(about = "Serve air-pollution and nightlight plots from analysis scripts")]
struct App {
    /// Load this config file instead of the global and project files
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EndpointArg {
    Pollution,
    TimeSeries,
    Ntl,
}

impl From<EndpointArg> for Endpoint {
    fn from(arg: EndpointArg) -> Self {
        match arg {
            EndpointArg::Pollution => Endpoint::Pollution,
            EndpointArg::TimeSeries => Endpoint::TimeSeries,
            EndpointArg::Ntl => Endpoint::Ntl,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Listen address, overrides server.addr
        #[arg(long)]
        addr: Option<String>,
        /// Worker threads, overrides server.workers
        #[arg(long)]
        workers: Option<usize>,
    },
    /// List registered analysis scripts and whether they exist
    Scripts {
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// List week options for the week selector
    Weeks {
        /// Only the most recent N weeks
        #[arg(long)]
        limit: Option<usize>,
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Resolve a duration selection to dates without running a script
    Resolve {
        /// Date, Year, Month, Season or Week
        #[arg(long, default_value = "Date")]
        duration: String,
        #[arg(long)]
        year: Option<String>,
        /// Month name, season (march-may, ...) or week token
        #[arg(long)]
        timeframe: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// legacy or gregorian, overrides resolver.calendar
        #[arg(long)]
        calendar: Option<String>,
    },
    /// Request a plot from a running server and save it
    Fetch {
        #[arg(value_enum)]
        endpoint: EndpointArg,
        /// Body field as key=value, e.g. -F city=Mumbai
        #[arg(short = 'F', long = "field")]
        fields: Vec<String>,
        /// Server base URL (default: http://<server.addr>)
        #[arg(long)]
        server: Option<String>,
        /// Output file (default: plot.png or plot.html)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show invocation statistics from the log
    Stats {
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
        /// Only include the last N days of data
        #[arg(long)]
        days: Option<u32>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default config to ~/.airplot/config.toml
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Set a dotted key, e.g. scripts.timeout_secs 120
    Set { key: String, value: String },
    /// Reset ~/.airplot/config.toml to defaults
    Reset,
}

fn load_config(path: Option<&PathBuf>) -> Result<AirplotConfig> {
    match path {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
}

fn main() -> Result<()> {
    let app = App::parse();

    match app.command {
        Commands::Serve { addr, workers } => {
            let mut cfg = load_config(app.config.as_ref())?;
            if let Some(addr) = addr {
                cfg.server.addr = addr;
            }
            if let Some(workers) = workers {
                cfg.server.workers = workers;
            }
            web::serve(cfg)
        }
        Commands::Scripts { format } => {
            let cfg = load_config(app.config.as_ref())?;
            cli::run_scripts(&cfg, OutputFormat::from_str_opt(Some(&format)))
        }
        Commands::Weeks { limit, format } => {
            cli::run_weeks(limit, OutputFormat::from_str_opt(Some(&format)))
        }
        Commands::Resolve {
            duration,
            year,
            timeframe,
            start,
            end,
            calendar,
        } => {
            let cfg = load_config(app.config.as_ref())?;
            let args = ResolveArgs {
                duration,
                year,
                timeframe,
                start,
                end,
                calendar,
            };
            cli::run_resolve(&cfg, &args)
        }
        Commands::Fetch {
            endpoint,
            fields,
            server,
            output,
        } => {
            let cfg = load_config(app.config.as_ref())?;
            let path = Endpoint::from(endpoint).path();
            let server = server.unwrap_or_else(|| format!("http://{}", cfg.server.addr));
            let output = output.unwrap_or_else(|| cli::default_output(path));
            let timeout = cli::fetch_timeout(cfg.scripts.timeout_secs);
            cli::run_fetch(&server, path, &fields, &output, timeout)
        }
        Commands::Stats { format, days } => {
            let cfg = load_config(app.config.as_ref())?;
            cli::run_stats(&cfg, OutputFormat::from_str_opt(Some(&format)), days)
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let cfg = load_config(app.config.as_ref())?;
                cli::run_config_show(&cfg)
            }
            ConfigAction::Init { force } => cli::run_config_init(force),
            ConfigAction::Set { key, value } => cli::run_config_set(&key, &value),
            ConfigAction::Reset => cli::run_config_reset(),
        },
    }
}
