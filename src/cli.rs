use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(version, about = "Resolve search queries to playable track URLs")]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = TracingFormat::Json)]
    pub tracing: TracingFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    Pretty,
    Json,
}
