use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "docrag",
    version,
    about = "Document question answering service and evaluation tools"
)]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, global = true, default_value = "config.json")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the ingest/query HTTP service.
    Serve(ServeArgs),
    /// Score a running service against the evaluation dataset.
    Evaluate(EvaluateArgs),
    /// Fill the dataset's keywords column using the language model.
    ExtractKeywords(ExtractKeywordsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Service endpoint to query (defaults to eval.api_url).
    #[arg(long)]
    pub api_url: Option<String>,

    #[arg(long)]
    pub dataset: Option<String>,

    #[arg(long)]
    pub results: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractKeywordsArgs {
    #[arg(long)]
    pub dataset: Option<String>,
}
