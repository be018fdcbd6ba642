//! retestream - forward-chaining inference over live RDF streams
//!
//! Usage:
//!   retestream --rules rules.txt --input data/sensors.nt --rate 100 --output inferred.nt
//!   retestream --rules rules.txt --mqtt-host localhost --mqtt-topic sensors
//!   retestream --rules rules.txt --config engine.json --input data/sensors.nt

use clap::Parser;
use retestream::config::{EngineConfig, MqttConfig};
use retestream::metrics::{EngineMetrics, MetricsSnapshot};
use retestream::nodes::{SystemClock, WindowConfig};
use retestream::parsing::RuleParser;
use retestream::sinks;
use retestream::sources::{FileSource, FileSourceConfig, MqttSource};
use retestream::topology::TopologyBuilder;
use retestream::transport::Cluster;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "retestream")]
#[command(about = "Distributed RETE inference over RDF triple streams", long_about = None)]
struct Args {
    /// Rule file, one Jena-style rule per line
    #[arg(short, long)]
    rules: PathBuf,

    /// N-Triples or N-Quads file to replay
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Replay rate in facts per second (0 = unlimited)
    #[arg(long, default_value = "0")]
    rate: u64,

    /// Replay the input file until interrupted
    #[arg(long)]
    loop_file: bool,

    /// Stamp replayed facts with the wall clock
    #[arg(long)]
    add_timestamps: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Append inferred facts to this N-Triples file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Subscribe to facts on this MQTT broker
    #[arg(long)]
    mqtt_host: Option<String>,

    #[arg(long, default_value = "1883")]
    mqtt_port: u16,

    #[arg(long, default_value = "facts")]
    mqtt_topic: String,

    /// Capacity of both join windows
    #[arg(long)]
    window_capacity: Option<usize>,

    /// Time range of both join windows in milliseconds
    #[arg(long)]
    window_range_ms: Option<u64>,

    #[arg(long)]
    join_parallelism: Option<usize>,

    #[arg(long)]
    filter_parallelism: Option<usize>,

    /// Do not feed inferred facts back into the network
    #[arg(long)]
    no_feedback: bool,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };

        if self.window_capacity.is_some() || self.window_range_ms.is_some() {
            let base = config.window.left;
            config = config.with_window(WindowConfig {
                capacity: self.window_capacity.unwrap_or(base.capacity),
                range_ms: self.window_range_ms.unwrap_or(base.range_ms),
            });
        }
        if let Some(join) = self.join_parallelism {
            config.parallelism.join = join;
        }
        if let Some(filter) = self.filter_parallelism {
            config.parallelism.filter = filter;
        }
        if let Some(output) = &self.output {
            config.sinks.file = Some(output.clone());
        }
        if self.no_feedback {
            config.feedback = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = args.engine_config()?;

    let rule_text = std::fs::read_to_string(&args.rules)?;
    let rules = RuleParser::new().parse_rules(&rule_text)?;
    info!("Loaded {} rules from {}", rules.len(), args.rules.display());

    let topology = TopologyBuilder::new(config.clone()).add_rules(rules).build()?;
    info!("{}", topology);

    let sinks = sinks::from_config(&config.sinks)?;
    let metrics = Arc::new(EngineMetrics::new());
    let cluster = Cluster::start(topology, Arc::new(SystemClock), metrics, sinks)?;

    let interrupted = Arc::new(Notify::new());
    let mut stop_flags: Vec<Arc<AtomicBool>> = Vec::new();

    let file_source = args.input.as_ref().map(|path| {
        FileSource::new(FileSourceConfig {
            rate: args.rate,
            loop_file: args.loop_file,
            add_timestamps: args.add_timestamps,
            ..FileSourceConfig::new(path)
        })
    });
    let mqtt_source = args.mqtt_host.as_ref().map(|host| {
        MqttSource::new(MqttConfig {
            host: host.clone(),
            port: args.mqtt_port,
            topic: args.mqtt_topic.clone(),
            client_id: "retestream_source".to_string(),
            ..MqttConfig::default()
        })
    });
    stop_flags.extend(file_source.as_ref().map(FileSource::stop_flag));
    stop_flags.extend(mqtt_source.as_ref().map(MqttSource::stop_flag));

    let notify = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C, stopping...");
        for flag in &stop_flags {
            flag.store(true, Ordering::Relaxed);
        }
        notify.notify_one();
    })?;

    if file_source.is_none() && mqtt_source.is_none() {
        warn!("No input given; pass --input or --mqtt-host");
    }

    if let Some(source) = &file_source {
        let replay = source.replay(|fact| cluster.submit(fact)).await?;
        info!(
            events = replay.events_read,
            parse_errors = replay.parse_errors,
            "Replay finished at {:.1} facts/sec",
            replay.events_per_second()
        );
    }
    if let Some(source) = &mqtt_source {
        source.run(|fact| cluster.submit(fact)).await?;
    }

    info!("Waiting for the network to become idle");
    tokio::select! {
        () = cluster.wait_idle() => info!("Network idle"),
        () = interrupted.notified() => {
            warn!(in_flight = cluster.in_flight().count(), "Interrupted before idle");
        }
    }

    print_summary(&cluster.metrics());
    cluster.shutdown().await;

    Ok(())
}

fn print_summary(metrics: &MetricsSnapshot) {
    println!("\nInference Summary");
    println!("=================");
    println!("Facts received:     {}", metrics.facts_received);
    println!("Filter bindings:    {}", metrics.filter_bindings);
    println!("Join matches:       {}", metrics.join_matches);
    println!("Window evictions:   {}", metrics.window_evictions);
    println!("Rule fires:         {}", metrics.fires);
    println!("Guard rejections:   {}", metrics.guard_rejections);
    println!("Facts inferred:     {}", metrics.facts_inferred);
    println!("Facts rejected:     {}", metrics.facts_rejected);
    println!("Facts re-injected:  {}", metrics.facts_reinjected);
    println!("Sink errors:        {}", metrics.sink_errors);
    println!("Failed deliveries:  {}", metrics.failed_deliveries);
    println!("Dropped deliveries: {}", metrics.dropped_deliveries);
    println!("Elapsed time:       {:.2}s", metrics.elapsed_seconds);
    println!("Throughput:         {:.1} facts/sec", metrics.facts_per_second());
}
