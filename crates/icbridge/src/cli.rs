//! Clap derive structures for the `icbridge` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use clap::{Args, Parser, Subcommand, ValueEnum};
use icbridge_core::{Color, TemperatureUnits};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// icbridge -- talk to a Pentair IntelliCenter from the command line
#[derive(Debug, Parser)]
#[command(
    name = "icbridge",
    version,
    about = "Discover, watch and control an IntelliCenter pool controller",
    long_about = "Connects to an IntelliCenter over its local JSON protocol (port 6681),\n\
        discovers bodies, features, lights, heaters and pumps, and keeps\n\
        them in sync with the controller's change notifications.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Controller profile to use
    #[arg(long, short = 'p', env = "ICBRIDGE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller host (overrides profile)
    #[arg(long, short = 'H', env = "ICBRIDGE_HOST", global = true)]
    pub host: Option<String>,

    /// Controller port (overrides profile)
    #[arg(long, env = "ICBRIDGE_PORT", global = true)]
    pub port: Option<u16>,

    /// Login name, for controllers that prompt for one
    #[arg(long, short = 'u', env = "ICBRIDGE_USERNAME", global = true)]
    pub username: Option<String>,

    /// Login password
    #[arg(long, env = "ICBRIDGE_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Temperature unit the controller is set to
    #[arg(long, value_parser = parse_units, global = true)]
    pub units: Option<TemperatureUnits>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "ICBRIDGE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Seconds to wait for discovery to complete
    #[arg(long, env = "ICBRIDGE_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,
}

fn parse_units(raw: &str) -> Result<TemperatureUnits, String> {
    raw.parse()
        .map_err(|_| format!("expected 'F' or 'C', got '{raw}'"))
}

fn parse_color(raw: &str) -> Result<Color, String> {
    raw.parse()
        .map_err(|_| format!("expected white, red, green, blue or magenta, got '{raw}'"))
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect, run discovery and print what the controller exposes
    #[command(alias = "ls")]
    Discover(DiscoverArgs),

    /// Stream entity changes until interrupted
    Watch(WatchArgs),

    /// Turn a circuit, feature or body on or off
    Set {
        /// Circuit id (e.g. C0003) or name
        circuit: String,
        state: Switch,
    },

    /// Set the power level (0-100) of a pump-driven circuit; 0 turns it off
    Speed {
        /// Circuit id or name
        circuit: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Select the heater for a body, or turn heating off
    Heat {
        /// Body id or name
        body: String,
        /// Heater id or name, or "off"
        heater: String,
    },

    /// Set a body's heating setpoint, in degrees Celsius
    Temp {
        /// Body id or name
        body: String,
        #[arg(allow_negative_numbers = true)]
        celsius: f64,
    },

    /// Set an IntelliBrite light's color
    Color {
        /// Light id or name
        circuit: String,
        #[arg(id = "light_color", value_name = "COLOR", value_parser = parse_color)]
        color: Color,
    },

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DISCOVER / WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Print the raw topology tree instead of the entity listing
    #[arg(long)]
    pub topology: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only show events for these object ids
    #[arg(long = "id", value_name = "ID")]
    pub ids: Vec<String>,

    /// Also print connection state transitions
    #[arg(long)]
    pub state: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the current configuration (secrets masked)
    Show,

    /// Create or update a profile from --host, --port, --username,
    /// --password and --units
    Init {
        /// Profile name (defaults to the active profile)
        #[arg(long)]
        name: Option<String>,

        /// Store the password in the config file instead of the keyring
        #[arg(long)]
        plaintext: bool,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
