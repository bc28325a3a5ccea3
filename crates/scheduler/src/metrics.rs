use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::job::JobState;

/// Scheduler operational metrics exposed over the API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Jobs currently admitted but not yet started.
    pub scheduled: usize,
    /// Jobs currently executing.
    pub running: usize,
    /// Terminal jobs by final state since startup.
    pub finished: HashMap<JobState, u64>,
    /// Terminal jobs dropped by the retention sweep.
    pub evicted: u64,
    /// Executed runs by provider id.
    pub executions: HashMap<String, u64>,
    /// Average run duration by provider id.
    pub avg_duration: HashMap<String, Duration>,
    /// Last terminal time by provider id.
    pub last_finished: HashMap<String, DateTime<Utc>>,
}

impl SchedulerMetrics {
    /// Count one job reaching a terminal state.
    pub fn record_terminal(&mut self, state: JobState) {
        *self.finished.entry(state).or_default() += 1;
    }

    /// Record one execution that went through a worker.
    pub fn record_execution(&mut self, provider: &str, duration: Duration) {
        *self.executions.entry(provider.to_string()).or_default() += 1;
        self.last_finished.insert(provider.to_string(), Utc::now());

        // Update rolling average duration
        let count = self.executions[provider];
        let prev_avg = self
            .avg_duration
            .get(provider)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_duration.insert(provider.to_string(), new_avg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_execution() {
        let mut m = SchedulerMetrics::default();
        m.record_execution("ocr.recognition", Duration::from_millis(100));

        assert_eq!(m.executions["ocr.recognition"], 1);
        assert!(m.last_finished.contains_key("ocr.recognition"));
        assert_eq!(
            m.avg_duration["ocr.recognition"],
            Duration::from_millis(100)
        );
    }

    #[test]
    fn record_multiple_executions_averages() {
        let mut m = SchedulerMetrics::default();
        m.record_execution("p", Duration::from_millis(100));
        m.record_execution("p", Duration::from_millis(200));

        assert_eq!(m.executions["p"], 2);
        // Average of 100ms and 200ms = 150ms
        let avg = m.avg_duration["p"].as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }

    #[test]
    fn terminal_states_count_separately() {
        let mut m = SchedulerMetrics::default();
        m.record_terminal(JobState::Completed);
        m.record_terminal(JobState::Completed);
        m.record_terminal(JobState::Canceled);

        assert_eq!(m.finished[&JobState::Completed], 2);
        assert_eq!(m.finished[&JobState::Canceled], 1);
        assert!(!m.finished.contains_key(&JobState::Unknown));
    }
}
