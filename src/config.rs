//! shell configuration

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub prompt: String,
    /// print error source chains, not just the message
    pub verbose: bool,
    /// set up host metric collection at startup
    pub metrics: bool,
    /// sampling period for host and machine metrics, seconds
    pub metric_period: u32,
    /// samples kept per metric
    pub metric_samples: u32,
    /// longest single wait on the event pump
    pub monitor_slice: Duration,
    /// what an unbounded monitor actually runs for
    pub monitor_ceiling: Duration,
    pub default_monitor_secs: f64,
    pub default_frontend: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "vbox> ".to_string(),
            verbose: true,
            metrics: true,
            // 15 samples every 10s: 150 seconds of history
            metric_period: 10,
            metric_samples: 15,
            monitor_slice: Duration::from_millis(500),
            monitor_ceiling: Duration::from_secs(100_000),
            default_monitor_secs: 5.0,
            default_frontend: "gui".to_string(),
        }
    }
}
