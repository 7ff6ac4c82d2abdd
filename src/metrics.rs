//! wrapper over the service's performance collector
//!
//! the collector answers queries as parallel arrays; `PerfCollector::query`
//! turns them into one `MetricRecord` per (metric, subject) pair.

use std::sync::Arc;

use crate::error::ApiResult;
use crate::vbox::{MetricsData, PerformanceCollector, Subject};

/// one metric as returned by a query
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub name: String,
    pub subject: Subject,
    pub unit: String,
    /// divide `values` by this to get the real value
    pub scale: u32,
    pub values: Vec<i64>,
    /// `values` ready for printing, e.g. `[2.50 %, 3.00 %]`
    pub display: String,
}

pub struct PerfCollector {
    collector: Arc<dyn PerformanceCollector>,
}

impl PerfCollector {
    pub fn new(collector: Arc<dyn PerformanceCollector>) -> Self {
        Self { collector }
    }

    /// drop collected values, set period and retained sample count, enable
    pub fn setup(
        &self,
        names: &[&str],
        subjects: &[Subject],
        period: u32,
        samples: u32,
    ) -> ApiResult<()> {
        self.collector.setup_metrics(names, subjects, period, samples)
    }

    pub fn enable(&self, names: &[&str], subjects: &[Subject]) -> ApiResult<()> {
        self.collector.enable_metrics(names, subjects)
    }

    pub fn disable(&self, names: &[&str], subjects: &[Subject]) -> ApiResult<()> {
        self.collector.disable_metrics(names, subjects)
    }

    pub fn query(&self, names: &[&str], subjects: &[Subject]) -> ApiResult<Vec<MetricRecord>> {
        let data = self.collector.query_metrics_data(names, subjects)?;
        Ok(records(&data))
    }
}

fn records(data: &MetricsData) -> Vec<MetricRecord> {
    let mut out = Vec::with_capacity(data.names.len());
    for (i, name) in data.names.iter().enumerate() {
        let start = data.indices.get(i).copied().unwrap_or(0);
        let len = data.lengths.get(i).copied().unwrap_or(0);
        let values: Vec<i64> = start
            .checked_add(len)
            .and_then(|end| data.values.get(start..end))
            .map(<[i64]>::to_vec)
            .unwrap_or_default();
        let unit = data.units.get(i).cloned().unwrap_or_default();
        // a zero scale would divide by zero, treat it as unscaled
        let scale = data.scales.get(i).copied().filter(|s| *s != 0).unwrap_or(1);
        let subject = data.subjects.get(i).cloned().unwrap_or(Subject::Host);

        out.push(MetricRecord {
            display: format_values(&values, scale, &unit),
            name: name.clone(),
            subject,
            unit,
            scale,
            values,
        });
    }
    out
}

/// render samples as `[v unit, ...]`, two decimals when scaled
pub fn format_values(values: &[i64], scale: u32, unit: &str) -> String {
    let parts: Vec<String> = values
        .iter()
        .map(|v| {
            if scale == 1 {
                format!("{} {}", v, unit)
            } else {
                format!("{:.2} {}", *v as f64 / scale as f64, unit)
            }
        })
        .collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unscaled_values_render_as_integers() {
        assert_eq!(format_values(&[5], 1, "MB"), "[5 MB]");
        assert_eq!(format_values(&[5, 7], 1, "MB"), "[5 MB, 7 MB]");
    }

    #[test]
    fn scaled_values_render_two_decimals() {
        assert_eq!(format_values(&[250], 100, "%"), "[2.50 %]");
        assert_eq!(format_values(&[1000, 5], 1000, "%"), "[1.00 %, 0.01 %]");
    }

    #[test]
    fn empty_samples() {
        assert_eq!(format_values(&[], 1, "MB"), "[]");
    }

    #[test]
    fn parallel_arrays_are_split_per_metric() {
        let data = MetricsData {
            values: vec![1, 2, 3, 250],
            names: vec!["RAM/Usage/Used".into(), "CPU/Load/User".into()],
            subjects: vec![Subject::Host, Subject::Machine("vm".into())],
            units: vec!["kB".into(), "%".into()],
            scales: vec![1, 100],
            sequence_numbers: vec![0, 0],
            indices: vec![0, 3],
            lengths: vec![3, 1],
        };
        let out = records(&data);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].values, vec![1, 2, 3]);
        assert_eq!(out[0].display, "[1 kB, 2 kB, 3 kB]");
        assert_eq!(out[1].subject, Subject::Machine("vm".into()));
        assert_eq!(out[1].display, "[2.50 %]");
    }

    #[test]
    fn short_arrays_do_not_panic() {
        let data = MetricsData {
            values: vec![1],
            names: vec!["X".into()],
            indices: vec![0],
            lengths: vec![4],
            ..Default::default()
        };
        let out = records(&data);
        assert_eq!(out[0].values, Vec::<i64>::new());
        assert_eq!(out[0].scale, 1);
    }

    #[test]
    fn overflowing_index_yields_no_samples() {
        let data = MetricsData {
            values: vec![1, 2],
            names: vec!["X".into()],
            indices: vec![usize::MAX],
            lengths: vec![2],
            ..Default::default()
        };
        let out = records(&data);
        assert!(out[0].values.is_empty());
        assert_eq!(out[0].display, "[]");
    }
}
