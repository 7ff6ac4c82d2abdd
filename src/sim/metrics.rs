use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{ApiError, ApiResult};
use crate::vbox::{MetricsData, PerformanceCollector, Subject};

struct MetricDef {
    name: &'static str,
    unit: &'static str,
    scale: u32,
    base: i64,
    /// host metric when true, per-machine otherwise
    host: bool,
}

const CATALOG: &[MetricDef] = &[
    MetricDef { name: "CPU/Load/User", unit: "%", scale: 1000, base: 12_500, host: true },
    MetricDef { name: "CPU/Load/Kernel", unit: "%", scale: 1000, base: 3_250, host: true },
    MetricDef { name: "CPU/MHz", unit: "MHz", scale: 1, base: 2400, host: true },
    MetricDef { name: "RAM/Usage/Total", unit: "kB", scale: 1, base: 4_194_304, host: true },
    MetricDef { name: "RAM/Usage/Used", unit: "kB", scale: 1, base: 1_572_864, host: true },
    MetricDef { name: "Guest/CPU/Load/User", unit: "%", scale: 1000, base: 5_000, host: false },
    MetricDef { name: "Guest/CPU/Load/Kernel", unit: "%", scale: 1000, base: 1_500, host: false },
    MetricDef { name: "Guest/RAM/Usage/Total", unit: "kB", scale: 1, base: 524_288, host: false },
    MetricDef { name: "Guest/RAM/Usage/Free", unit: "kB", scale: 1, base: 219_136, host: false },
];

struct Series {
    def: &'static MetricDef,
    subject: Subject,
    period: Duration,
    capacity: usize,
    enabled: bool,
    last_sample: Instant,
    sequence: u32,
    samples: VecDeque<i64>,
}

impl Series {
    fn new(def: &'static MetricDef, subject: Subject, period: Duration, capacity: usize) -> Self {
        let mut series = Self {
            def,
            subject,
            period,
            capacity,
            enabled: true,
            last_sample: Instant::now(),
            sequence: 0,
            samples: VecDeque::with_capacity(capacity),
        };
        series.push_sample();
        series
    }

    fn push_sample(&mut self) {
        // deterministic wobble around the base value
        let wobble = (i64::from(self.sequence) * 37 % 17 - 8) * (self.def.base / 100).max(1);
        self.samples.push_back(self.def.base + wobble);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.sequence = self.sequence.wrapping_add(1);
    }

    /// take the samples whose period elapsed since the last one
    fn catch_up(&mut self, now: Instant) {
        if !self.enabled {
            self.last_sample = now;
            return;
        }
        let elapsed = now.duration_since(self.last_sample).as_secs_f64();
        let due = (elapsed / self.period.as_secs_f64()) as usize;
        for _ in 0..due.min(self.capacity) {
            self.push_sample();
        }
        if due > 0 {
            self.last_sample = now;
        }
    }
}

fn name_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

fn subject_fits(def: &MetricDef, subject: &Subject) -> bool {
    matches!(subject, Subject::Host) == def.host
}

fn selected(series: &Series, names: &[&str], subjects: &[Subject]) -> bool {
    names.iter().any(|p| name_matches(p, series.def.name)) && subjects.contains(&series.subject)
}

/// sampling collector that produces values on demand
pub struct SimCollector {
    series: Mutex<Vec<Series>>,
    fail_setup: Mutex<bool>,
}

impl SimCollector {
    pub(super) fn new() -> Self {
        Self {
            series: Mutex::new(Vec::new()),
            fail_setup: Mutex::new(false),
        }
    }

    /// make every following setup call fail
    pub fn fail_setup(&self, fail: bool) {
        *self.fail_setup.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// number of (metric, subject) pairs currently configured
    pub fn configured(&self) -> usize {
        self.lock().len()
    }

    /// number of configured pairs that are collecting
    pub fn enabled(&self) -> usize {
        self.lock().iter().filter(|s| s.enabled).count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Series>> {
        self.series.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PerformanceCollector for SimCollector {
    fn setup_metrics(
        &self,
        names: &[&str],
        subjects: &[Subject],
        period: u32,
        count: u32,
    ) -> ApiResult<()> {
        if *self.fail_setup.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(ApiError::Unavailable("performance collector is not running".into()));
        }
        if period == 0 || count == 0 {
            return Err(ApiError::InvalidArgument(
                "period and sample count must be positive".into(),
            ));
        }
        let mut series = self.lock();
        for subject in subjects {
            for def in CATALOG.iter().filter(|d| subject_fits(d, subject)) {
                if !names.iter().any(|p| name_matches(p, def.name)) {
                    continue;
                }
                series.retain(|s| !(s.def.name == def.name && &s.subject == subject));
                series.push(Series::new(
                    def,
                    subject.clone(),
                    Duration::from_secs(u64::from(period)),
                    count as usize,
                ));
            }
        }
        Ok(())
    }

    fn enable_metrics(&self, names: &[&str], subjects: &[Subject]) -> ApiResult<()> {
        let now = Instant::now();
        for s in self.lock().iter_mut().filter(|s| selected(s, names, subjects)) {
            s.enabled = true;
            s.last_sample = now;
        }
        Ok(())
    }

    fn disable_metrics(&self, names: &[&str], subjects: &[Subject]) -> ApiResult<()> {
        let now = Instant::now();
        for s in self.lock().iter_mut().filter(|s| selected(s, names, subjects)) {
            s.catch_up(now);
            s.enabled = false;
        }
        Ok(())
    }

    fn query_metrics_data(&self, names: &[&str], subjects: &[Subject]) -> ApiResult<MetricsData> {
        let now = Instant::now();
        let mut data = MetricsData::default();
        for s in self.lock().iter_mut().filter(|s| selected(s, names, subjects)) {
            s.catch_up(now);
            data.names.push(s.def.name.to_string());
            data.subjects.push(s.subject.clone());
            data.units.push(s.def.unit.to_string());
            data.scales.push(s.def.scale);
            data.sequence_numbers.push(s.sequence);
            data.indices.push(data.values.len());
            data.lengths.push(s.samples.len());
            data.values.extend(s.samples.iter().copied());
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_pick_matching_metrics() {
        assert!(name_matches("*", "CPU/Load/User"));
        assert!(name_matches("CPU/*", "CPU/Load/User"));
        assert!(!name_matches("RAM/*", "CPU/Load/User"));
        assert!(name_matches("CPU/MHz", "CPU/MHz"));
    }

    #[test]
    fn setup_replaces_previous_series() {
        let c = SimCollector::new();
        c.setup_metrics(&["*"], &[Subject::Host], 10, 15).unwrap();
        let host_metrics = c.configured();
        assert_eq!(host_metrics, CATALOG.iter().filter(|d| d.host).count());
        c.setup_metrics(&["CPU/*"], &[Subject::Host], 1, 2).unwrap();
        assert_eq!(c.configured(), host_metrics);
    }

    #[test]
    fn query_returns_only_configured_pairs() {
        let c = SimCollector::new();
        let vm = Subject::Machine("{vm}".into());
        c.setup_metrics(&["*"], &[vm.clone()], 10, 15).unwrap();
        assert!(c.query_metrics_data(&["*"], &[Subject::Host]).unwrap().names.is_empty());
        let data = c.query_metrics_data(&["Guest/RAM/*"], &[vm]).unwrap();
        assert_eq!(data.names, vec!["Guest/RAM/Usage/Total", "Guest/RAM/Usage/Free"]);
        assert_eq!(data.lengths, vec![1, 1]);
    }

    #[test]
    fn disable_keeps_configuration() {
        let c = SimCollector::new();
        c.setup_metrics(&["*"], &[Subject::Host], 10, 15).unwrap();
        c.disable_metrics(&["*"], &[Subject::Host]).unwrap();
        assert_eq!(c.enabled(), 0);
        assert!(c.configured() > 0);
        c.enable_metrics(&["CPU/*"], &[Subject::Host]).unwrap();
        assert_eq!(c.enabled(), 3);
    }

    #[test]
    fn retained_samples_are_capped() {
        let mut s = Series::new(&CATALOG[0], Subject::Host, Duration::from_millis(1), 3);
        let later = s.last_sample + Duration::from_millis(50);
        s.catch_up(later);
        assert_eq!(s.samples.len(), 3);
    }
}
