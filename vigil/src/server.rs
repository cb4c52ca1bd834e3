use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vigil_api::AppState;
use vigil_core::client::{IncidentClient, InferenceClient};
use vigil_core::store::{RedisStore, SnapshotStore};
use vigil_core::Config;
use vigil_pipeline::incident::IncidentAssembler;
use vigil_pipeline::intake::IntakeWorker;
use vigil_pipeline::registry::ProcessorRegistry;
use vigil_pipeline::CHANNEL_CAPACITY;

/// Wires the pipeline together and serves HTTP until cancelled.
pub struct VigilServer {
    config: Config,
}

impl VigilServer {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn start(self, cancel: CancellationToken) -> Result<()> {
        let config = &self.config;

        // Bootstrap failures here are fatal: without the working directories,
        // the store, or the listener there is no pipeline to run.
        let workdir = PathBuf::from(&config.workdir);
        let accident_root = PathBuf::from(&config.accident_root);
        tokio::fs::create_dir_all(&workdir)
            .await
            .with_context(|| format!("create workdir {}", workdir.display()))?;
        tokio::fs::create_dir_all(&accident_root)
            .await
            .with_context(|| format!("create accident root {}", accident_root.display()))?;

        let store: Arc<dyn SnapshotStore> = Arc::new(
            RedisStore::connect(&config.redis_url())
                .await
                .with_context(|| format!("connect store at {}:{}", config.redis_host, config.redis_port))?,
        );
        info!(host = %config.redis_host, port = config.redis_port, "snapshot store connected");

        let inference = InferenceClient::new(config.inference_url.clone());
        let incident = IncidentClient::new(config.incident_url.clone());

        let assembler = IncidentAssembler::new(
            accident_root,
            incident,
            store.clone(),
            cancel.child_token(),
        );
        assembler.clone().spawn();

        let registry = ProcessorRegistry::new(
            workdir.clone(),
            inference.clone(),
            assembler.submission_sender(),
            store.clone(),
            cancel.child_token(),
        );

        let (intake_tx, intake_rx) = IntakeWorker::channel();
        let (staged_tx, staged_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut drains = Vec::new();
        drains.push(tokio::spawn(
            IntakeWorker::new(workdir, staged_tx).run(intake_rx, cancel.child_token()),
        ));
        drains.push(tokio::spawn(registry.clone().run_dispatch(staged_rx)));
        drains.push(tokio::spawn(
            registry
                .clone()
                .run_reaper(Duration::from_secs(config.pipeline_idle_ttl_secs)),
        ));

        let state = AppState::new(registry, assembler, intake_tx, inference, store);
        let app = vigil_api::router(state);

        let listen_addr = config.listen_addr();
        let listener = tokio::net::TcpListener::bind(&listen_addr)
            .await
            .with_context(|| format!("bind {listen_addr}"))?;
        info!(addr = %listen_addr, "http service listening");

        let shutdown = cancel.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("http service")?;

        // The listener is down; make sure every drain observes the cancel
        // and settles before we report a clean shutdown.
        cancel.cancel();
        for drain in drains {
            let _ = drain.await;
        }

        Ok(())
    }
}
