//! Interval-driven polling of the configured nodes.
//!
//! Three independent jobs share the radio link through the correlator, so a
//! tick that fires while another cycle is in flight simply waits its turn.
//! Within one tick nodes are handled one after another, and a failure on
//! one node never stops the rest.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::ScheduleConfig;
use crate::node::NodeManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollJob {
    NodeData,
    PumpStatus,
    TankThreshold,
}

impl PollJob {
    pub const ALL: [PollJob; 3] = [PollJob::NodeData, PollJob::PumpStatus, PollJob::TankThreshold];

    pub fn name(&self) -> &'static str {
        match self {
            PollJob::NodeData => "fetch_node_data",
            PollJob::PumpStatus => "log_pump_status",
            PollJob::TankThreshold => "log_tank_threshold",
        }
    }

    pub fn period(&self, schedule: &ScheduleConfig) -> Duration {
        let secs = match self {
            PollJob::NodeData => schedule.node_data_secs,
            PollJob::PumpStatus => schedule.pump_status_secs,
            PollJob::TankThreshold => schedule.tank_threshold_secs,
        };
        Duration::from_secs(secs)
    }

    /// Run one firing of the job
    pub async fn run(&self, manager: &NodeManager) -> JobSummary {
        match self {
            PollJob::NodeData => poll_node_data(manager).await,
            PollJob::PumpStatus => poll_pump_status(manager).await,
            PollJob::TankThreshold => poll_tank_threshold(manager).await,
        }
    }
}

/// What one firing achieved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub answered: usize,
    pub silent: usize,
    pub failed: usize,
}

pub async fn poll_node_data(manager: &NodeManager) -> JobSummary {
    log::info!("Fetching data from nodes...");
    let mut summary = JobSummary::default();
    for &node_id in manager.node_ids() {
        match manager.fetch_node_data(node_id).await {
            Ok(Some(_)) => summary.answered += 1,
            Ok(None) => summary.silent += 1,
            Err(e) => {
                log::error!("Failed to fetch data from Node {}: {}", node_id, e);
                summary.failed += 1;
            }
        }
    }
    summary
}

pub async fn poll_pump_status(manager: &NodeManager) -> JobSummary {
    log::info!("Fetching pump statuses...");
    let mut summary = JobSummary::default();
    for &node_id in manager.node_ids() {
        match manager.pump_status(node_id).await {
            Ok(Some(on)) => {
                log::info!("Pump status for Node {}: {}", node_id, if on { "ON" } else { "OFF" });
                summary.answered += 1;
            }
            Ok(None) => {
                log::warn!("No response for pump status from Node {}", node_id);
                summary.silent += 1;
            }
            Err(e) => {
                log::error!("Failed to fetch pump status from Node {}: {}", node_id, e);
                summary.failed += 1;
            }
        }
    }
    summary
}

pub async fn poll_tank_threshold(manager: &NodeManager) -> JobSummary {
    log::info!("Fetching tank water level threshold...");
    let mut summary = JobSummary::default();
    match manager.tank_threshold().await {
        Ok(Some(threshold)) => {
            log::info!("Tank water level threshold: {} liters", threshold);
            summary.answered += 1;
        }
        Ok(None) => {
            log::warn!("No response from tank node");
            summary.silent += 1;
        }
        Err(e) => {
            log::error!("Failed to fetch tank threshold: {}", e);
            summary.failed += 1;
        }
    }
    summary
}

/// Running scheduler; dropping it leaves the jobs running, call `shutdown`
pub struct Poller {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Poller {
    /// Spawn one task per job. The first firing happens one period after start.
    pub fn start(manager: Arc<NodeManager>, schedule: &ScheduleConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = PollJob::ALL
            .iter()
            .map(|&job| {
                let period = job.period(schedule);
                log::info!("Scheduled {} every {:?}", job.name(), period);
                tokio::spawn(job_loop(job, period, manager.clone(), shutdown_rx.clone()))
            })
            .collect();

        Self {
            handles,
            shutdown_tx,
        }
    }

    /// Stop all jobs. A job in the middle of a cycle finishes that cycle first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                log::warn!("Poll job ended abnormally: {}", e);
            }
        }
        log::info!("Poller stopped");
    }
}

async fn job_loop(
    job: PollJob,
    period: Duration,
    manager: Arc<NodeManager>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = job.run(&manager).await;
                log::debug!("{} finished: {:?}", job.name(), summary);
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
