use clap::{Args, Parser, Subcommand};

#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum CliCommands {
    /// Track events through a demo pipeline and print what the channel received.
    Track(TrackArgs),
    /// Print the effective configuration as TOML.
    Config(CliCommandArgs),
}

impl CliCommands {
    pub fn common(&self) -> &CliCommandArgs {
        match self {
            Self::Track(args) => &args.common,
            Self::Config(args) => args,
        }
    }
}

#[derive(Args, Clone, Debug, Default)]
pub struct CliCommandArgs {
    /// Directory holding config.toml. Defaults to ~/.sonde
    #[arg(long)]
    pub home_path: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Instrumentation key stamped on every item.
    #[arg(short = 'k', long)]
    pub instrumentation_key: Option<String>,

    /// Period of the internal log flush in milliseconds.
    #[arg(long)]
    pub diagnostic_log_interval_ms: Option<i64>,

    /// Additional registry names of extensions to load.
    #[arg(short = 'e', long = "extension")]
    pub extensions: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct TrackArgs {
    #[command(flatten)]
    pub common: CliCommandArgs,

    /// Name of the events to track.
    #[arg(short = 'n', long)]
    pub name: String,

    #[arg(short = 'c', long, default_value_t = 1)]
    pub count: u32,

    /// Custom property attached to every event, as key=value.
    #[arg(short = 'p', long = "property", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}
