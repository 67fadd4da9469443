//! Dashboard API route handlers.
//!
//! All endpoints return JSON. Read endpoints only touch `DashboardState`
//! and the loaded config, so they never wait on a running cycle;
//! `/api/trigger` takes the orchestrator lock.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::config::AppConfig;
use crate::engine::CycleOrchestrator;
use crate::types::CycleReport;

/// Cycle reports kept for `/api/cycles`.
const CYCLE_LOG_CAPACITY: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct Counters {
    cycle_count: u64,
    signals_sent: u64,
    failed_cycles: u64,
}

/// Read-side view of the agent, updated after every cycle.
pub struct DashboardState {
    pub started_at: DateTime<Utc>,
    pub agent_name: String,
    pub instrument: String,
    counters: RwLock<Counters>,
    cycle_log: RwLock<VecDeque<CycleReport>>,
}

impl DashboardState {
    pub fn new(agent_name: &str, instrument: &str) -> Self {
        Self {
            started_at: Utc::now(),
            agent_name: agent_name.to_string(),
            instrument: instrument.to_string(),
            counters: RwLock::new(Counters::default()),
            cycle_log: RwLock::new(VecDeque::with_capacity(CYCLE_LOG_CAPACITY)),
        }
    }

    pub async fn record(&self, report: &CycleReport, signals_sent: u64) {
        {
            let mut c = self.counters.write().await;
            c.cycle_count = report.cycle_number;
            c.signals_sent = signals_sent;
            if report.outcome.is_failure() {
                c.failed_cycles += 1;
            }
        }
        let mut log = self.cycle_log.write().await;
        if log.len() == CYCLE_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(report.clone());
    }
}

/// Handle shared by the daemon loop and the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub status: Arc<DashboardState>,
    pub orchestrator: Arc<Mutex<CycleOrchestrator>>,
    /// Config the agent was started with.
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(orchestrator: CycleOrchestrator, config: AppConfig) -> Self {
        let status = DashboardState::new(orchestrator.agent_name(), orchestrator.instrument());
        Self {
            status: Arc::new(status),
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            config: Arc::new(config),
        }
    }

    /// Run one cycle under the orchestrator lock and record it.
    pub async fn run_cycle(&self) -> CycleReport {
        let (report, sent) = {
            let mut orch = self.orchestrator.lock().await;
            let report = orch.run_cycle().await;
            (report, orch.signals_sent())
        };
        self.status.record(&report, sent).await;
        report
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub agent: String,
    pub instrument: String,
    pub uptime_secs: i64,
    pub cycle_count: u64,
    pub signals_sent: u64,
    pub failed_cycles: u64,
    pub last_cycle: Option<CycleReport>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let s = &state.status;
    let counters = s.counters.read().await.clone();
    let last_cycle = s.cycle_log.read().await.back().cloned();

    Json(StatusResponse {
        status: "ALIVE".to_string(),
        agent: s.agent_name.clone(),
        instrument: s.instrument.clone(),
        uptime_secs: (Utc::now() - s.started_at).num_seconds(),
        cycle_count: counters.cycle_count,
        signals_sent: counters.signals_sent,
        failed_cycles: counters.failed_cycles,
        last_cycle,
    })
}

/// GET /api/cycles (newest first)
pub async fn get_cycles(State(state): State<AppState>) -> Json<Vec<CycleReport>> {
    let log = state.status.cycle_log.read().await;
    Json(log.iter().rev().cloned().collect())
}

/// GET /api/config
///
/// Credential env-var names are skipped when the config serializes.
pub async fn get_config(State(state): State<AppState>) -> Json<AppConfig> {
    Json(state.config.as_ref().clone())
}

/// POST /api/trigger
pub async fn trigger(State(state): State<AppState>) -> Json<CycleReport> {
    info!("Cycle triggered via API");
    Json(state.run_cycle().await)
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
