use crate::types::{ConnectionStatus, Sweep, SweepHistory};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// State published to display collaborators.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    pub status: ConnectionStatus,
    /// Name of the device that produced the latest sweep, if one is active.
    pub device_name: Option<String>,
    pub current_sweep: Sweep,
    pub history: SweepHistory,
    pub sweeps_published: u64,
}

/// Read-mostly shared view of the pipeline.
///
/// Status is written only by the lifecycle manager; sweeps, history and the
/// device name only by the acquisition loop.
#[derive(Clone, Default)]
pub struct Monitor {
    inner: Arc<RwLock<MonitorState>>,
}

impl Monitor {
    pub fn new(history_capacity: usize) -> Self {
        let state = MonitorState {
            history: SweepHistory::new(history_capacity),
            ..Default::default()
        };
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MonitorState> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MonitorState> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn snapshot(&self) -> MonitorState {
        self.read().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.read().status
    }

    pub fn device_name(&self) -> Option<String> {
        self.read().device_name.clone()
    }

    pub fn current_sweep(&self) -> Sweep {
        self.read().current_sweep.clone()
    }

    pub fn history_len(&self) -> usize {
        self.read().history.len()
    }

    pub fn sweeps_published(&self) -> u64 {
        self.read().sweeps_published
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.write().status = status;
    }

    pub(crate) fn set_device_name(&self, name: Option<&str>) {
        let mut state = self.write();
        if state.device_name.as_deref() != name {
            state.device_name = name.map(str::to_string);
        }
    }

    /// Make `sweep` current and push it into the history.
    pub(crate) fn publish_sweep(&self, sweep: Sweep) {
        let mut state = self.write();
        state.history.push(sweep.clone());
        state.current_sweep = sweep;
        state.sweeps_published += 1;
    }
}
