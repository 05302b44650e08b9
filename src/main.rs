//! Lattice Traffic - shift traffic between service builds on an Istio mesh

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lattice_common::kube_utils::create_client;
use lattice_common::retry::RetryConfig;
use lattice_common::telemetry::{init_telemetry, TelemetryConfig};
use lattice_traffic::context::ShiftContext;
use lattice_traffic::operator::TrafficOperator;
use lattice_traffic::shift::{RolloutTarget, Shift, Traffic};
use lattice_traffic::store::KubeMeshStore;

/// Lattice Traffic - canary and blue/green traffic shifting for Istio
#[derive(Parser, Debug)]
#[command(name = "lattice-traffic", version, about, long_about = None)]
struct Cli {
    /// Path to kubeconfig (defaults to in-cluster or ~/.kube/config)
    #[arg(long, env = "LATTICE_TRAFFIC_KUBECONFIG", global = true)]
    kubeconfig: Option<PathBuf>,

    /// Deadline for the whole operation in seconds
    #[arg(long, env = "LATTICE_TRAFFIC_TIMEOUT_SECS", default_value = "60", global = true)]
    timeout_secs: u64,

    /// Attempts per resource kind when a concurrent writer wins the race
    #[arg(
        long,
        env = "LATTICE_TRAFFIC_MAX_CONFLICT_RETRIES",
        default_value = "5",
        global = true
    )]
    max_conflict_retries: u32,

    /// Emit logs as JSON lines
    #[arg(long, env = "LATTICE_TRAFFIC_LOG_JSON", global = true)]
    log_json: bool,

    /// Log filter directive overriding RUST_LOG (e.g., "lattice_traffic=debug")
    #[arg(long, env = "LATTICE_TRAFFIC_LOG_FILTER", global = true)]
    log_filter: Option<String>,

    /// Correlation id attached to every log line (random if unset)
    #[arg(long, env = "LATTICE_TRAFFIC_TRACKING_ID", global = true)]
    tracking_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the VirtualServices the shift selects
    Get(ShiftArgs),

    /// Add or re-weight the route and subset for a build
    Update(ShiftArgs),

    /// Remove inactive routes and the subsets they referenced
    Clear(ShiftArgs),
}

/// A shift, given inline or as a YAML file
#[derive(Args, Debug)]
struct ShiftArgs {
    /// Path to a YAML shift document
    #[arg(
        short = 'f',
        long = "file",
        conflicts_with_all = [
            "service", "namespace", "build", "hostname", "port",
            "selector", "pod_selector", "headers", "weight",
        ]
    )]
    file: Option<PathBuf>,

    /// Service name
    #[arg(long, required_unless_present = "file")]
    service: Option<String>,

    /// Namespace of the service and its mesh resources
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Build number receiving the traffic
    #[arg(long, required_unless_present = "file")]
    build: Option<u32>,

    /// Destination host written into routes
    #[arg(long, required_unless_present = "file")]
    hostname: Option<String>,

    /// Destination port written into routes
    #[arg(long, required_unless_present = "file")]
    port: Option<u16>,

    /// Label selecting VirtualServices and DestinationRules (repeatable, KEY=VALUE)
    #[arg(long = "selector", value_parser = parse_key_val, required_unless_present = "file")]
    selector: Vec<(String, String)>,

    /// Pod label defining the subset (repeatable, KEY=VALUE)
    #[arg(long = "pod-selector", value_parser = parse_key_val)]
    pod_selector: Vec<(String, String)>,

    /// Exact-match request header (repeatable, NAME=VALUE)
    #[arg(long = "header", value_parser = parse_key_val)]
    headers: Vec<(String, String)>,

    /// Percentage of traffic for the build (0 when routing by header)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    weight: i32,
}

impl ShiftArgs {
    fn into_shift(self) -> anyhow::Result<Shift> {
        if let Some(path) = self.file {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read shift file {:?}", path))?;
            return serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse shift file {:?}", path));
        }

        // clap enforces these when no file is given
        let missing = |flag: &str| anyhow::anyhow!("--{flag} is required without --file");
        Ok(Shift {
            target: RolloutTarget::new(
                self.service.ok_or_else(|| missing("service"))?,
                self.namespace,
                self.build.ok_or_else(|| missing("build"))?,
            ),
            hostname: self.hostname.ok_or_else(|| missing("hostname"))?,
            port: self.port.ok_or_else(|| missing("port"))?,
            selector: self.selector.into_iter().collect(),
            traffic: Traffic {
                pod_selector: self.pod_selector.into_iter().collect(),
                request_headers: self.headers.into_iter().collect::<BTreeMap<_, _>>(),
                weight: self.weight,
            },
        })
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        json: cli.log_json,
        filter: cli.log_filter.clone(),
    })?;

    let tracking_id = cli
        .tracking_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received Ctrl+C, cancelling in-flight calls");
            on_signal.cancel();
        }
    });

    let ctx = ShiftContext::new(tracking_id.clone())
        .with_timeout(Duration::from_secs(cli.timeout_secs))
        .with_cancel(cancel)
        .with_retry(RetryConfig::with_max_attempts(cli.max_conflict_retries));

    let result = run(cli.command, cli.kubeconfig, &ctx).await;
    if let Err(e) = &result {
        error!(tracking_id = %tracking_id, error = %e, "traffic shift failed");
    }
    result
}

async fn run(
    command: Commands,
    kubeconfig: Option<PathBuf>,
    ctx: &ShiftContext,
) -> anyhow::Result<()> {
    let client = create_client(kubeconfig.as_deref()).await?;
    let operator = TrafficOperator::istio(Arc::new(KubeMeshStore::new(client)));

    match command {
        Commands::Get(args) => {
            let shift = args.into_shift()?;
            let services = operator.get(ctx, &shift).await?;
            let yaml =
                serde_yaml::to_string(&services).context("failed to render virtualservices")?;
            println!("{yaml}");
        }
        Commands::Update(args) => {
            let shift = args.into_shift()?;
            operator.update(ctx, &shift).await?;
            info!(tracking_id = %ctx.tracking_id, subset = %shift.subset_name(), "traffic shifted");
        }
        Commands::Clear(args) => {
            let shift = args.into_shift()?;
            operator.clear(ctx, &shift).await?;
            info!(tracking_id = %ctx.tracking_id, "inactive routes cleared");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_val_requires_separator_and_key() {
        assert_eq!(
            parse_key_val("app=api").unwrap(),
            ("app".to_string(), "api".to_string())
        );
        assert_eq!(
            parse_key_val("x-canary=").unwrap(),
            ("x-canary".to_string(), String::new())
        );
        assert!(parse_key_val("app").is_err());
        assert!(parse_key_val("=api").is_err());
    }

    #[test]
    fn inline_flags_build_a_weighted_shift() {
        let cli = Cli::try_parse_from([
            "lattice-traffic",
            "update",
            "--service",
            "api",
            "--build",
            "2",
            "--hostname",
            "api.domain.io",
            "--port",
            "5000",
            "--selector",
            "environment=pipeline",
            "--pod-selector",
            "app=api",
            "--pod-selector",
            "build=24",
            "--weight",
            "10",
        ])
        .unwrap();

        let Commands::Update(args) = cli.command else {
            panic!("expected update subcommand");
        };
        let shift = args.into_shift().unwrap();
        assert_eq!(shift.subset_name(), "api-2-default");
        assert_eq!(shift.traffic.weight, 10);
        assert_eq!(shift.traffic.pod_selector.len(), 2);
        assert!(shift.traffic.request_headers.is_empty());
    }

    #[test]
    fn file_conflicts_with_inline_target() {
        let err = Cli::try_parse_from([
            "lattice-traffic",
            "get",
            "-f",
            "shift.yaml",
            "--service",
            "api",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn file_conflicts_with_inline_traffic() {
        for flag in [
            ["--weight", "10"],
            ["--namespace", "prod"],
            ["--header", "x-version=v2"],
            ["--pod-selector", "app=api"],
        ] {
            let err = Cli::try_parse_from(
                ["lattice-traffic", "update", "-f", "shift.yaml"]
                    .into_iter()
                    .chain(flag),
            )
            .unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict, "{flag:?}");
        }
    }

    #[test]
    fn file_alone_is_accepted() {
        let cli = Cli::try_parse_from(["lattice-traffic", "clear", "-f", "shift.yaml"]).unwrap();
        let Commands::Clear(args) = cli.command else {
            panic!("expected clear subcommand");
        };
        assert_eq!(args.file, Some(PathBuf::from("shift.yaml")));
    }

    #[test]
    fn inline_shift_requires_target_flags() {
        let err = Cli::try_parse_from(["lattice-traffic", "clear", "--service", "api"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
