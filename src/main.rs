//! Strata operator entrypoint

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strata::controller::{error_policy, reconcile, Context};
use strata::sources::{
    KubeConfigSource, KubeInstanceLookup, KubeOutputSink, KubeResourceSink, KubeStatusWriter,
};
use strata_common::crd::{StrataClusterConfig, StrataProjectConfig, WorkloadInstance};

/// Strata - deployment-time configuration resolution for Kubernetes workloads
#[derive(Parser, Debug)]
#[command(name = "strata", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider before anything opens a TLS connection
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: failed to install crypto provider: {e:?}. \
             The operator cannot talk to the API server without a working TLS stack."
        );
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        for crd in [
            WorkloadInstance::crd(),
            StrataClusterConfig::crd(),
            StrataProjectConfig::crd(),
        ] {
            println!("---");
            print!("{}", serde_yaml::to_string(&crd)?);
        }
        return Ok(());
    }

    run_controller().await
}

/// Ensure all Strata CRDs are installed.
///
/// The operator installs its own CRDs on startup using server-side apply, so
/// the CRD versions always match the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("strata-controller").force();

    for (name, crd) in [
        ("workloadinstances.strata.dev", WorkloadInstance::crd()),
        ("strataclusterconfigs.strata.dev", StrataClusterConfig::crd()),
        ("strataprojectconfigs.strata.dev", StrataProjectConfig::crd()),
    ] {
        tracing::info!(crd = name, "installing CRD");
        crds.patch(name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install CRD {name}: {e}"))?;
    }

    tracing::info!("all Strata CRDs installed/updated");
    Ok(())
}

async fn run_controller() -> anyhow::Result<()> {
    let client = Client::try_default().await?;
    ensure_crds_installed(&client).await?;

    let ctx = Arc::new(Context {
        config_source: Arc::new(KubeConfigSource::new(client.clone())),
        lookup: Arc::new(KubeInstanceLookup::new(client.clone())),
        resources: Arc::new(KubeResourceSink::new(client.clone())),
        outputs: Arc::new(KubeOutputSink::new(client.clone())),
        status: Arc::new(KubeStatusWriter::new(client.clone())),
    });

    let instances: Api<WorkloadInstance> = Api::all(client);
    tracing::info!("WorkloadInstance controller starting");

    Controller::new(instances, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "instance reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "instance reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Strata controller shutting down");
    Ok(())
}
