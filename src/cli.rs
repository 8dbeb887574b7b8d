use clap::{Parser, Subcommand};

use chroma_hipot::port::DEFAULT_BAUDRATE;
use chroma_hipot::Model;

fn parse_with_radix<T>(input: &str) -> Result<T, T::FromStrRadixErr>
where
    T: num_traits::Num,
    <T as num_traits::Num>::FromStrRadixErr: std::error::Error + Send + Sync,
{
    if input.starts_with("0x") {
        T::from_str_radix(input.trim_start_matches("0x"), 16)
    } else if input.starts_with("0b") {
        T::from_str_radix(input.trim_start_matches("0b"), 2)
    } else {
        T::from_str_radix(input, 10)
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Skip sanity checks
    #[clap(long, short)]
    pub force: bool,

    /// enable debug output
    #[clap(long, short)]
    pub debug: bool,

    /// Serial device or 'auto'
    #[clap(long, short, default_value = "auto")]
    pub port: String,

    /// Serial baud rate
    #[clap(long, short, default_value_t = DEFAULT_BAUDRATE)]
    pub baudrate: u32,

    /// Instrument model
    #[clap(long, short, default_value = "chroma-19073")]
    pub model: Model,

    /// Reply timeout in milliseconds
    #[clap(long, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Result polling interval in milliseconds
    #[clap(long, default_value_t = 100)]
    pub poll_ms: u64,

    /// Give up waiting for a running test after this many seconds
    #[clap(long, default_value_t = 600)]
    pub wait_s: u64,

    /// Use json-formatted output
    #[clap(long, short)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List supported instrument models
    ListModels,

    /// Print the instrument identification string
    Identify,

    /// Start the programmed test
    Start,

    /// Stop a running test
    Stop,

    /// Clear all programmed steps
    Clear,

    /// Program an AC withstand step (times in s, limits in A)
    ProgramAc {
        #[clap(parse(try_from_str=parse_with_radix))]
        step: u8,
        voltage: u16,
        ramp: f64,
        test: f64,
        fall: f64,
        high_limit: f64,
        #[clap(default_value_t = 0.0)]
        low_limit: f64,
        #[clap(default_value_t = 0.0)]
        arc_limit: f64,
    },

    /// Program a DC withstand step (times in s, limits in A)
    ProgramDc {
        #[clap(parse(try_from_str=parse_with_radix))]
        step: u8,
        voltage: u16,
        ramp: f64,
        dwell: f64,
        test: f64,
        fall: f64,
        high_limit: f64,
        #[clap(default_value_t = 0.0)]
        low_limit: f64,
        #[clap(default_value_t = 0.0)]
        arc_limit: f64,
        /// Enable inrush current checking
        #[clap(long)]
        inrush: bool,
    },

    /// Read the result of one step (0 = current)
    #[clap(name = "result", visible_alias = "res")]
    GetResult {
        #[clap(default_value_t = 0, parse(try_from_str=parse_with_radix))]
        step: u8,
    },

    /// Wait for the running test and print every step result
    Wait,

    /// Start the programmed test and wait for its results
    Run,
}
