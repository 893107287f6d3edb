use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(name = "code-judger", version)]
pub struct Opts {
    #[clap(subcommand)]
    pub cmd: SubCmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCmd {
    /// Judge a single work item and print its judgement
    #[clap(name = "run")]
    Run(RunSubCmd),

    /// Judge newline-delimited work items until the input ends
    #[clap(name = "batch")]
    Batch(BatchSubCmd),

    /// List the configured languages
    #[clap(name = "languages")]
    Languages(LanguagesSubCmd),
}

#[derive(Parser, Debug, Clone)]
pub struct RunSubCmd {
    /// JSON file containing the work item
    #[clap(name = "work-item")]
    pub work_item: PathBuf,

    /// Judger configuration file (TOML)
    #[clap(long, short, name = "config-file-path")]
    pub config: Option<PathBuf>,

    /// Store the judgement as `<id>.json` in this folder instead of printing it
    #[clap(long = "out-dir", short, name = "out-path")]
    pub out_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct BatchSubCmd {
    /// File with one JSON work item per line. Defaults to standard input.
    #[clap(long, short, name = "input-path")]
    pub input: Option<PathBuf>,

    /// Judger configuration file (TOML)
    #[clap(long, short, name = "config-file-path")]
    pub config: Option<PathBuf>,

    /// Store judgements as `<id>.json` in this folder instead of printing them
    #[clap(long = "out-dir", short, name = "out-path")]
    pub out_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct LanguagesSubCmd {
    /// Judger configuration file (TOML)
    #[clap(long, short, name = "config-file-path")]
    pub config: Option<PathBuf>,
}
