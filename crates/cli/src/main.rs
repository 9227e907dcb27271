#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use cnvrg_core::Ownership;
use cnvrg_reconcile::ReconcileConfig;
use leader::LeaseConfig;

mod controller;
mod leader;
mod render;

#[derive(Parser, Debug)]
#[command(name = "cnvrg-operator", version, about = "Reconciles CnvrgApp application stacks")]
struct Cli {
    /// Debug logging unless CNVRG_LOG is set
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller against the current kube context
    Run(RunArgs),
    /// Print the CnvrgApp and CnvrgInfra CRDs as YAML
    Crd,
    /// Render the objects a CnvrgApp would produce, without a cluster
    Render {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
        #[arg(long = "namespace")]
        namespace: Option<String>,
        /// Container runtime assumed when the app leaves `cri` unset
        #[arg(long = "cri", default_value = "containerd", value_parser = ["containerd", "cri-o", "docker"])]
        cri: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Prometheus exporter listen address (host:port)
    #[arg(long = "metrics-addr", env = "CNVRG_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
    #[arg(long, env = "CNVRG_OWN_ISTIO_RESOURCES", default_value_t = true, action = ArgAction::Set)]
    own_istio_resources: bool,
    #[arg(long, env = "CNVRG_OWN_OPENSHIFT_RESOURCES", default_value_t = false, action = ArgAction::Set)]
    own_openshift_resources: bool,
    #[arg(long, env = "CNVRG_OWN_PROMETHEUS_RESOURCES", default_value_t = true, action = ArgAction::Set)]
    own_prometheus_resources: bool,
    #[arg(long, env = "CNVRG_CONFLICT_RETRIES", default_value_t = 5)]
    conflict_retries: usize,
    #[arg(long, env = "CNVRG_REGISTRY_RETRY_SECS", default_value_t = 30)]
    registry_retry_secs: u64,
    #[arg(long, env = "CNVRG_ERROR_REQUEUE_SECS", default_value_t = 15)]
    error_requeue_secs: u64,
    /// Hold a Lease so only one replica reconciles at a time
    #[arg(long, env = "CNVRG_ENABLE_LEADER_ELECTION", default_value_t = false, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    enable_leader_election: bool,
    /// Namespace of the leader Lease (defaults to the kube context namespace)
    #[arg(long, env = "CNVRG_LEADER_ELECTION_NAMESPACE")]
    leader_election_namespace: Option<String>,
}

impl RunArgs {
    fn config(&self) -> ReconcileConfig {
        ReconcileConfig {
            conflict_retries: self.conflict_retries,
            registry_retry: Duration::from_secs(self.registry_retry_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            ownership: Ownership {
                istio: self.own_istio_resources,
                openshift: self.own_openshift_resources,
                prometheus: self.own_prometheus_resources,
            },
        }
    }

    fn lease(&self) -> Option<LeaseConfig> {
        self.enable_leader_election
            .then(|| LeaseConfig { namespace: self.leader_election_namespace.clone(), ..Default::default() })
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env = std::env::var("CNVRG_LOG").unwrap_or_else(|_| default.to_string());
    let filter = tracing_subscriber::EnvFilter::try_new(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics(addr: Option<SocketAddr>) {
    if let Some(sock) = addr {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        match builder.with_http_listener(sock).install() {
            Ok(_) => tracing::info!(addr = %sock, "Prometheus metrics exporter listening"),
            Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            init_metrics(args.metrics_addr);
            controller::run(args.config(), args.lease()).await
        }
        Commands::Crd => {
            print!("{}", render::crds()?);
            Ok(())
        }
        Commands::Render { file, namespace, cri } => {
            let text = std::fs::read_to_string(&file)?;
            print!("{}", render::render(&text, namespace.as_deref(), &cri).await?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "cnvrg-operator",
            "run",
            "--own-istio-resources",
            "false",
            "--own-openshift-resources",
            "true",
            "--conflict-retries",
            "2",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else { panic!("expected run") };
        let cfg = args.config();
        assert_eq!(cfg.ownership, Ownership { istio: false, openshift: true, prometheus: true });
        assert_eq!(cfg.conflict_retries, 2);
        assert_eq!(cfg.error_requeue, Duration::from_secs(15));
    }

    #[test]
    fn leader_election_flag_maps_onto_lease() {
        let lease_of = |argv: &[&str]| {
            let cli = Cli::try_parse_from(argv).unwrap();
            let Commands::Run(args) = cli.command else { panic!("expected run") };
            args.lease()
        };
        assert_eq!(lease_of(&["cnvrg-operator", "run"]), None);
        assert_eq!(lease_of(&["cnvrg-operator", "run", "--enable-leader-election", "false"]), None);

        let lease = lease_of(&["cnvrg-operator", "run", "--enable-leader-election"]).unwrap();
        assert_eq!(lease.name, "99748453.cnvrg.io");
        assert_eq!(lease.namespace, None);

        let lease = lease_of(&["cnvrg-operator", "run", "--enable-leader-election", "true", "--leader-election-namespace", "cnvrg"]).unwrap();
        assert_eq!(lease.namespace.as_deref(), Some("cnvrg"));
    }

    #[test]
    fn render_rejects_unknown_runtime() {
        assert!(Cli::try_parse_from(["cnvrg-operator", "render", "-f", "app.yaml", "--cri", "rkt"]).is_err());
    }
}
