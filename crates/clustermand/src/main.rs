//! `clustermand` — the autoscaling daemon binary. Assembles the
//! signal driver, pool manager, and autoscaling loop for one
//! (cluster, pool) into a single `tokio` runtime, the way `warpd`
//! assembles its own subsystems into one process.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use clusterman_autoscaler::{Autoscaler, LoggingHealthCheckSink};
use clusterman_metrics::HttpMetricsClient;
use clusterman_pool::{HttpClusterManagerClient, PoolManager};
use clusterman_resource_groups::registry;

use config::DaemonConfig;

#[derive(Parser)]
#[command(name = "clustermand", about = "Weighted capacity autoscaler for a cluster-manager pool")]
struct Cli {
    /// Path to `clustermand.toml`.
    #[arg(long, global = true, default_value = "clustermand.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the autoscaling control loop until shutdown.
    Run {
        #[arg(long)]
        cluster: Option<String>,
        #[arg(long)]
        pool: Option<String>,
        /// Compute and log decisions without touching any provider.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a one-shot pool status summary and exit.
    Status {
        #[arg(long)]
        cluster: Option<String>,
        #[arg(long)]
        pool: Option<String>,
        #[arg(long)]
        verbose: bool,
        #[arg(long)]
        only_idle: bool,
        #[arg(long)]
        only_orphans: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,clustermand=debug,clusterman=debug".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    let config = DaemonConfig::from_file(&cli.config)?;

    match cli.command {
        Command::Run { cluster, pool, dry_run } => {
            let cluster = cluster.unwrap_or_else(|| config.pool.cluster.clone());
            let pool_name = pool.unwrap_or_else(|| config.pool.pool.clone());
            run(config, cluster, pool_name, dry_run).await
        }
        Command::Status {
            cluster,
            pool,
            verbose,
            only_idle,
            only_orphans,
        } => {
            let cluster = cluster.unwrap_or_else(|| config.pool.cluster.clone());
            let pool_name = pool.unwrap_or_else(|| config.pool.pool.clone());
            status(config, cluster, pool_name, verbose, only_idle, only_orphans).await
        }
    }
}

async fn build_aws_clients(region: &str) -> (aws_sdk_ec2::Client, aws_sdk_autoscaling::Client, aws_sdk_s3::Client) {
    let shared_config = aws_config::from_env().region(aws_config::Region::new(region.to_string())).load().await;
    (
        aws_sdk_ec2::Client::new(&shared_config),
        aws_sdk_autoscaling::Client::new(&shared_config),
        aws_sdk_s3::Client::new(&shared_config),
    )
}

async fn build_pool_manager(config: &DaemonConfig, cluster: &str, pool_name: &str) -> anyhow::Result<PoolManager> {
    let (ec2, asg, _s3) = build_aws_clients(&config.aws_region).await;
    let groups = registry::load_all(cluster, pool_name, &config.pool.resource_groups, &asg, &ec2).await?;
    let groups = groups.into_values().collect();
    Ok(PoolManager::new(cluster, pool_name, config.pool.capacity, groups))
}

/// Resolve each signal's `required_metrics` patterns against the
/// published metrics index (§6), so the driver sends concrete metric
/// names rather than regexes over the wire.
async fn expand_signal_metrics(config: &mut DaemonConfig, s3: &aws_sdk_s3::Client) -> anyhow::Result<()> {
    let index = clusterman_metrics::fetch_metrics_index(s3, &config.metrics_index_bucket, &config.aws_region).await?;
    config.pool.signal.required_metrics = clusterman_metrics::expand_metric_specs(&config.pool.signal.required_metrics, &index)?;
    config.pool.default_signal.required_metrics = clusterman_metrics::expand_metric_specs(&config.pool.default_signal.required_metrics, &index)?;
    Ok(())
}

/// §5/§6: run the control loop until SIGINT or SIGTERM, exiting
/// non-zero only if the default signal itself fails a tick.
async fn run(mut config: DaemonConfig, cluster: String, pool_name: String, dry_run: bool) -> anyhow::Result<()> {
    info!(%cluster, pool = %pool_name, dry_run, "clustermand starting");

    let (_, _, s3) = build_aws_clients(&config.aws_region).await;
    expand_signal_metrics(&mut config, &s3).await?;

    let pool = build_pool_manager(&config, &cluster, &pool_name).await?;
    let cluster_client = HttpClusterManagerClient::new(config.cluster_manager_url.clone());
    cluster_client.refresh().await?;

    let metrics_client: Arc<dyn clusterman_metrics::MetricsClient> = Arc::new(HttpMetricsClient::new(config.metrics_store_url.clone()));

    let primary_signal = clusterman_signal::Signal::start(
        cluster.clone(),
        pool_name.clone(),
        None,
        &config.pool.namespace,
        config.pool.signal.clone(),
        metrics_client.clone(),
    )
    .await?;
    let default_signal = clusterman_signal::Signal::start(
        cluster.clone(),
        pool_name.clone(),
        None,
        &config.pool.namespace,
        config.pool.default_signal.clone(),
        metrics_client,
    )
    .await?;

    let health: Arc<dyn clusterman_autoscaler::HealthCheckSink> = Arc::new(LoggingHealthCheckSink);
    let run_frequency = Duration::from_secs(config.pool.signal.run_frequency_secs());

    let mut autoscaler = Autoscaler::new(
        cluster.clone(),
        pool_name.clone(),
        config.pool.autoscaling,
        Box::new(primary_signal),
        Box::new(default_signal),
        health,
        pool,
        cluster_client,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let run_handle = tokio::spawn(async move { autoscaler.run(run_frequency, shutdown_rx, now_unix, dry_run).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }
    let _ = shutdown_tx.send(true);
    let default_signal_failed = run_handle.await.unwrap_or(false);

    info!("clustermand stopped");
    if default_signal_failed {
        anyhow::bail!("default signal failed at least once during this run");
    }
    Ok(())
}

async fn status(config: DaemonConfig, cluster: String, pool_name: String, verbose: bool, only_idle: bool, only_orphans: bool) -> anyhow::Result<()> {
    let pool = build_pool_manager(&config, &cluster, &pool_name).await?;
    let cluster_client = HttpClusterManagerClient::new(config.cluster_manager_url.clone());
    cluster_client.refresh().await?;

    let summary = clusterman_pool::summarize(&cluster, &pool_name, pool.groups(), &cluster_client);
    println!("{summary}");

    if verbose {
        for (id, class) in &summary.instances {
            let show = match (only_idle, only_orphans) {
                (true, _) => matches!(class, clusterman_pool::summary::InstanceClass::Idle),
                (_, true) => matches!(class, clusterman_pool::summary::InstanceClass::Orphaned),
                _ => true,
            };
            if show {
                println!("  {id} {class:?}");
            }
        }
    }
    Ok(())
}

/// Unix seconds "now," kept as a one-line seam so tests elsewhere in
/// the workspace can inject a fixed clock instead of the real one.
fn now_unix() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
