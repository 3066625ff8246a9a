//! Background work for each menu action.
//!
//! Every function here runs on its own task and sees only the [`ActionContext`]
//! snapshot taken at dispatch time; results travel back as a [`Completion`].

use crate::engine::readiness::{self, PollParams};
use crate::engine::{session, shell, ManagedProcess, Output, Probe, ProcessRegistry};
use crate::error::ActionError;
use crate::model::{Action, LauncherConfig};
use crate::orchestrator::state::{Completion, Outcome};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a background unit may use. Cloned at dispatch; never refers back to live state.
#[derive(Clone)]
pub(crate) struct ActionContext {
    pub cfg: Arc<LauncherConfig>,
    pub client: Client,
    pub registry: ProcessRegistry,
    pub existing: Option<ManagedProcess>,
}

pub(crate) async fn execute(action: Action, ctx: ActionContext) -> Completion {
    let result = match action {
        Action::StartDatabase => start_database(&ctx).await,
        Action::StartCrawler => start_crawler(&ctx).await,
        Action::StartApi => start_managed(&ctx, api_plan(&ctx.cfg)).await,
        Action::StartFrontend => start_managed(&ctx, frontend_plan(&ctx.cfg)).await,
        Action::StopDatabase => stop_database(&ctx).await,
        Action::Quit => Ok(Outcome::Ready),
    };
    Completion { action, result }
}

fn compose_output(cfg: &LauncherConfig) -> Output {
    Output::Append(cfg.compose_log_path.clone())
}

async fn start_database(ctx: &ActionContext) -> Result<Outcome, ActionError> {
    let cfg = &ctx.cfg;
    let mut args = vec![
        "--profile".to_string(),
        cfg.compose_profile.clone(),
        "up".to_string(),
        "-d".to_string(),
    ];
    args.extend(cfg.compose_services.iter().cloned());
    shell::run_compose(&cfg.compose, &cfg.project_root, &args, &compose_output(cfg))
        .await
        .map_err(|e| e.with_log(&cfg.compose_log_path))?;

    let probe = Probe::Command(cfg.db_ready_command.clone());
    readiness::wait_until_ready(PollParams {
        probe: &probe,
        client: &ctx.client,
        interval: cfg.db_poll_interval,
        attempt_timeout: cfg.probe_timeout.max(cfg.db_poll_interval),
        timeout: cfg.ready_timeout,
        process: None,
        registry: &ctx.registry,
    })
    .await?;
    Ok(Outcome::Ready)
}

async fn stop_database(ctx: &ActionContext) -> Result<Outcome, ActionError> {
    let cfg = &ctx.cfg;
    let args = [
        "--profile".to_string(),
        cfg.compose_profile.clone(),
        "down".to_string(),
    ];
    shell::run_compose(&cfg.compose, &cfg.project_root, &args, &compose_output(cfg))
        .await
        .map_err(|e| e.with_log(&cfg.compose_log_path))?;
    Ok(Outcome::Ready)
}

fn worker_env(cfg: &LauncherConfig) -> String {
    format!(
        "DATABASE_TYPE=postgres POSTGRES_DATABASE_URL={} REDIS_URL={}",
        cfg.database_url, cfg.redis_url
    )
}

/// `cd` into the project and run `inner` inside the nix dev shell.
fn in_dev_shell(cfg: &LauncherConfig, inner: &str) -> String {
    format!(
        "cd '{}' && nix develop --command bash -lc '{inner}'",
        cfg.project_root.display()
    )
}

pub(crate) fn crawler_command(cfg: &LauncherConfig) -> String {
    in_dev_shell(
        cfg,
        &format!(
            "cd worker/crawler && {} cargo run --release --bin crawler",
            worker_env(cfg)
        ),
    )
}

pub(crate) fn api_command(cfg: &LauncherConfig) -> String {
    in_dev_shell(
        cfg,
        &format!(
            "cd worker/api && {} cargo run --release --bin api",
            worker_env(cfg)
        ),
    )
}

pub(crate) fn frontend_command(cfg: &LauncherConfig) -> String {
    in_dev_shell(
        cfg,
        "cd frontend && if [ ! -d node_modules ]; then yarn install --frozen-lockfile || yarn install; fi && yarn dev",
    )
}

async fn start_crawler(ctx: &ActionContext) -> Result<Outcome, ActionError> {
    session::open_in_terminal(&crawler_command(&ctx.cfg)).await?;
    tokio::time::sleep(ctx.cfg.crawler_settle).await;
    Ok(Outcome::Ready)
}

/// How to bring up one managed service.
pub(crate) struct LaunchPlan {
    pub name: &'static str,
    pub ready_url: String,
    pub command: String,
    pub log_path: PathBuf,
}

fn api_plan(cfg: &LauncherConfig) -> LaunchPlan {
    LaunchPlan {
        name: "api",
        ready_url: cfg.swagger_url.clone(),
        command: api_command(cfg),
        log_path: cfg.api_log_path.clone(),
    }
}

fn frontend_plan(cfg: &LauncherConfig) -> LaunchPlan {
    LaunchPlan {
        name: "frontend",
        ready_url: cfg.frontend_url.clone(),
        command: frontend_command(cfg),
        log_path: cfg.frontend_log_path.clone(),
    }
}

/// Reuse an endpoint that already answers; otherwise spawn and wait for readiness
/// or early exit. Failures carry the log path.
pub(crate) async fn start_managed(
    ctx: &ActionContext,
    plan: LaunchPlan,
) -> Result<Outcome, ActionError> {
    let cfg = &ctx.cfg;
    if readiness::is_url_ready(&ctx.client, &plan.ready_url, cfg.probe_timeout).await {
        tracing::info!(
            service = plan.name,
            url = %plan.ready_url,
            "endpoint already answering, not spawning"
        );
        return Ok(Outcome::AlreadyRunning);
    }

    // A handle that is alive but not answering is stuck; make room for the new one.
    if ctx.registry.is_alive(ctx.existing.as_ref()) {
        tracing::warn!(
            service = plan.name,
            "previous process alive but not ready, killing it"
        );
        ctx.registry.kill(ctx.existing.as_ref());
    }

    let process = ctx
        .registry
        .start(&plan.command, &plan.log_path)
        .map_err(|e| e.with_log(&plan.log_path))?;

    let probe = Probe::http(plan.ready_url.clone());
    let ready = readiness::wait_until_ready(PollParams {
        probe: &probe,
        client: &ctx.client,
        interval: cfg.poll_interval,
        attempt_timeout: cfg.probe_timeout,
        timeout: cfg.ready_timeout,
        process: Some(&process),
        registry: &ctx.registry,
    })
    .await;

    match ready {
        Ok(()) => {
            tracing::info!(service = plan.name, pid = process.pid(), "service ready");
            Ok(Outcome::Spawned(process))
        }
        Err(e) => {
            if matches!(e.root(), ActionError::ExitedEarly { .. }) {
                tracing::warn!(
                    service = plan.name,
                    pid = process.pid(),
                    "process exited before becoming ready"
                );
            } else {
                tracing::warn!(
                    service = plan.name,
                    pid = process.pid(),
                    error = %e,
                    "service not ready, killing it"
                );
                ctx.registry.kill(Some(&process));
            }
            Err(e.with_log(&plan.log_path))
        }
    }
}
