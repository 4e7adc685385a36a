//! Serving surface: wires the HTTP collaborators into a mission controller
//! and exposes the inbound endpoints.

mod routes;

pub use routes::{router, AppState, MissionLauncher};

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::llm::HttpModelClient;
use crate::mission::{MissionController, MissionRequest};
use crate::observer::HttpObserver;
use crate::recorder::DiskRecorder;
use crate::submit::HttpSubmitter;
use crate::workspace::Workspace;

/// Launcher that runs each accepted mission on the runtime with its own
/// workspace and audit directory.
pub struct SpawnLauncher {
    config: AgentConfig,
    controller: Arc<MissionController>,
}

impl SpawnLauncher {
    pub fn new(config: AgentConfig, controller: Arc<MissionController>) -> Self {
        Self { config, controller }
    }
}

impl MissionLauncher for SpawnLauncher {
    fn launch(&self, request: MissionRequest) {
        let controller = self.controller.clone();
        let workspace_root = self.config.workspace_root.clone();
        let log_root = self.config.log_root.clone();

        tokio::spawn(async move {
            let mission_id = Uuid::new_v4();
            let workspace = match Workspace::create(workspace_root.join(mission_id.to_string())) {
                Ok(workspace) => workspace,
                Err(err) => {
                    error!(%mission_id, error = %err, "cannot prepare mission workspace");
                    return;
                }
            };
            let recorder = match DiskRecorder::create(&log_root, &request.url) {
                Ok(recorder) => recorder,
                Err(err) => {
                    error!(%mission_id, error = %err, "cannot prepare mission audit trail");
                    return;
                }
            };
            info!(%mission_id, url = %request.url, dir = %recorder.dir().display(), "mission started");
            let report = controller.run(&request, workspace, &recorder).await;
            info!(%mission_id, status = ?report.status, "mission done");
        });
    }
}

/// Wire the HTTP collaborators into a controller for this configuration.
pub fn build_controller(config: &AgentConfig) -> Result<MissionController> {
    let observer = Arc::new(
        HttpObserver::new(std::time::Duration::from_secs(45))
            .context("failed to build page observer")?,
    );
    let model = Arc::new(
        HttpModelClient::new(
            config.api_base.clone(),
            config.api_token.clone(),
            config.model_timeout(),
        )
        .context("failed to build model client")?,
    );
    let submitter =
        Arc::new(HttpSubmitter::new(config.submit_timeout()).context("failed to build submitter")?);

    Ok(MissionController::new(
        config.clone(),
        observer,
        model,
        submitter,
    ))
}

/// Build the production controller and serve the inbound surface until the
/// listener fails.
pub async fn serve(config: AgentConfig) -> Result<()> {
    let controller = Arc::new(build_controller(&config)?);

    let state = AppState {
        secret: config.secret.clone(),
        launcher: Arc::new(SpawnLauncher::new(config.clone(), controller)),
    };

    let app = router(state).layer(CorsLayer::permissive());
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "inbound surface listening");
    axum::serve(listener, app.into_make_service())
        .await
        .context("server exited unexpectedly")?;
    Ok(())
}
