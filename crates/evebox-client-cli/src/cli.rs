//! Command line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use evebox_client_core::api::{
    AlertQueryOptions, EventQueryOptions, FlowHistogramOptions, PcapSource, ReportAggOptions,
    ReportHistogramOptions,
};
use evebox_client_core::SessionBackend;

#[derive(Debug, Parser)]
#[command(name = "evebox-client", version, about = "Command line client for the EveBox API")]
pub struct Cli {
    /// EveBox server URL
    #[arg(long, global = true, env = "EVEBOX_URL")]
    pub server: Option<String>,

    /// Where to keep the session token
    #[arg(long, global = true, value_enum)]
    pub session_backend: Option<BackendArg>,

    /// Accept invalid TLS certificates
    #[arg(short = 'k', long, global = true)]
    pub insecure: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BackendArg {
    File,
    Keyring,
    Memory,
}

impl From<BackendArg> for SessionBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::File => SessionBackend::File,
            BackendArg::Keyring => SessionBackend::Keyring,
            BackendArg::Memory => SessionBackend::Memory,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Save server and login defaults to the config file
    Configure {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Log in and store the session
    Login {
        #[arg(short, long, env = "EVEBOX_USERNAME")]
        username: Option<String>,
        /// Read from EVEBOX_PASSWORD or prompted when omitted
        #[arg(long, env = "EVEBOX_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Log out and drop the stored session
    Logout,
    /// Check the stored session and show the server version
    Status,
    /// Show the server version
    Version,
    /// Show the server's client configuration
    ServerConfig,
    /// GET an arbitrary API path
    Get {
        path: String,
        /// Query parameter as key=value, repeatable
        #[arg(short, long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },
    /// POST a JSON body to an arbitrary API path
    Post { path: String, body: String },
    /// Send an OPTIONS request and print the raw response
    Options { path: String },
    /// Query alerts
    Alerts(AlertArgs),
    /// Query events of any type
    Events(EventArgs),
    /// Event histogram report
    Histogram(HistogramArgs),
    /// Aggregation report
    Agg(AggArgs),
    /// Flow histogram
    FlowHistogram(FlowHistogramArgs),
    /// Show one event
    Event { id: String },
    /// Archive an event
    Archive { id: String },
    /// Escalate an event
    Escalate { id: String },
    /// De-escalate an event
    Deescalate { id: String },
    /// Comment on an event
    Comment { id: String, comment: String },
    /// Act on a group of alerts
    AlertGroup {
        #[arg(value_enum)]
        action: AlertGroupAction,
        /// File holding one alert group as returned by `alerts`
        group: PathBuf,
        /// Comment text, required for `comment`
        #[arg(short, long, required_if_eq("action", "comment"))]
        comment: Option<String>,
    },
    /// Submit EVE records from a newline-delimited JSON file
    Submit { file: PathBuf },
    /// Export an event as pcap
    Pcap {
        #[arg(value_enum)]
        what: PcapArg,
        /// File holding the event JSON
        event: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlertGroupAction {
    Archive,
    Escalate,
    Deescalate,
    Comment,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PcapArg {
    Packet,
    Payload,
}

impl From<PcapArg> for PcapSource {
    fn from(arg: PcapArg) -> Self {
        match arg {
            PcapArg::Packet => PcapSource::Packet,
            PcapArg::Payload => PcapSource::Payload,
        }
    }
}

#[derive(Debug, Args)]
pub struct AlertArgs {
    #[arg(short, long)]
    pub query: Option<String>,
    /// Only alerts with this tag, repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Exclude alerts with this tag, repeatable
    #[arg(long = "not-tag")]
    pub not_tags: Vec<String>,
    /// e.g. 86400s
    #[arg(long)]
    pub time_range: Option<String>,
}

impl From<AlertArgs> for AlertQueryOptions {
    fn from(args: AlertArgs) -> Self {
        AlertQueryOptions {
            query_string: args.query,
            must_have_tags: args.tags,
            must_not_have_tags: args.not_tags,
            time_range: args.time_range,
        }
    }
}

#[derive(Debug, Args)]
pub struct EventArgs {
    #[arg(short, long)]
    pub query: Option<String>,
    #[arg(long)]
    pub event_type: Option<String>,
    #[arg(long)]
    pub min_ts: Option<String>,
    #[arg(long)]
    pub max_ts: Option<String>,
    #[arg(long)]
    pub order: Option<String>,
    #[arg(long)]
    pub sort_by: Option<String>,
    #[arg(long)]
    pub size: Option<u64>,
    /// Seconds
    #[arg(long)]
    pub time_range: Option<u64>,
}

impl From<EventArgs> for EventQueryOptions {
    fn from(args: EventArgs) -> Self {
        EventQueryOptions {
            query_string: args.query,
            max_ts: args.max_ts,
            min_ts: args.min_ts,
            event_type: args.event_type,
            sort_order: args.order,
            sort_by: args.sort_by,
            size: args.size,
            time_range: args.time_range,
        }
    }
}

#[derive(Debug, Args)]
pub struct HistogramArgs {
    /// Seconds
    #[arg(long)]
    pub time_range: Option<u64>,
    #[arg(long)]
    pub interval: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(short, long)]
    pub query: Option<String>,
    #[arg(long)]
    pub sensor: Option<String>,
    #[arg(long)]
    pub event_type: Option<String>,
    #[arg(long)]
    pub dns_type: Option<String>,
}

impl From<HistogramArgs> for ReportHistogramOptions {
    fn from(args: HistogramArgs) -> Self {
        ReportHistogramOptions {
            time_range: args.time_range,
            interval: args.interval,
            address_filter: args.address,
            query_string: args.query,
            sensor_filter: args.sensor,
            event_type: args.event_type,
            dns_type: args.dns_type,
        }
    }
}

#[derive(Debug, Args)]
pub struct AggArgs {
    /// Field to aggregate on, e.g. src_ip
    pub agg: String,
    #[arg(long)]
    pub size: Option<u64>,
    #[arg(short, long)]
    pub query: Option<String>,
    /// Seconds
    #[arg(long)]
    pub time_range: Option<u64>,
    #[arg(long)]
    pub event_type: Option<String>,
    #[arg(long)]
    pub dns_type: Option<String>,
}

impl AggArgs {
    pub fn options(&self) -> ReportAggOptions {
        ReportAggOptions {
            size: self.size,
            query_string: self.query.clone(),
            time_range: self.time_range,
            event_type: self.event_type.clone(),
            dns_type: self.dns_type.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct FlowHistogramArgs {
    /// Break down by application protocol
    #[arg(long)]
    pub app_proto: bool,
    /// e.g. 3600s
    #[arg(long)]
    pub time_range: Option<String>,
    #[arg(short, long)]
    pub query: Option<String>,
    #[arg(long)]
    pub interval: Option<String>,
}

impl From<FlowHistogramArgs> for FlowHistogramOptions {
    fn from(args: FlowHistogramArgs) -> Self {
        FlowHistogramOptions {
            app_proto: args.app_proto,
            time_range: args.time_range,
            query_string: args.query,
            interval: args.interval,
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {}", s))
}
