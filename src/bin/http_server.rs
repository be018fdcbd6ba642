//! HTTP server binary for retestream
//!
//! Compiles a rule file into a running cluster and accepts facts over HTTP.
//!
//! Usage:
//!   cargo run --bin retestream_http -- --rules rules.txt --host 0.0.0.0 --port 8080

use clap::Parser;
use retestream::config::EngineConfig;
use retestream::http::start_server;
use retestream::metrics::EngineMetrics;
use retestream::nodes::SystemClock;
use retestream::parsing::RuleParser;
use retestream::sinks;
use retestream::topology::TopologyBuilder;
use retestream::transport::Cluster;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "retestream HTTP Server")]
#[command(about = "HTTP ingestion endpoint for the retestream RETE engine", long_about = None)]
struct Args {
    /// Rule file, one Jena-style rule per line
    #[arg(short, long)]
    rules: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Append inferred facts to this N-Triples file
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(output) = &args.output {
        config.sinks.file = Some(output.clone());
    }
    config.validate()?;

    let rules = RuleParser::new().parse_rules(&std::fs::read_to_string(&args.rules)?)?;
    let rule_count = rules.len();
    info!("Loaded {} rules from {}", rule_count, args.rules.display());

    let topology = TopologyBuilder::new(config.clone()).add_rules(rules).build()?;
    info!("{}", topology);

    let sinks = sinks::from_config(&config.sinks)?;
    let metrics = Arc::new(EngineMetrics::new());
    let cluster = Cluster::start(topology, Arc::new(SystemClock), metrics, sinks)?;

    let addr = format!("{}:{}", args.host, args.port);
    start_server(&addr, Arc::new(cluster), rule_count).await?;

    Ok(())
}
