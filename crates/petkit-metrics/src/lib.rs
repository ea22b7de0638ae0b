//! Metrics declarations for the Petkit protocol engine.
//!
//! The engine records through the `metrics` facade (re-exported here) using
//! the names in [`metric_defs`]. Nothing is exported until the embedding
//! process installs a recorder.
//!
//! # Example
//!
//! ```rust,ignore
//! use petkit_metrics::{DeviceLabels, metric_defs, describe_metrics};
//!
//! describe_metrics();
//!
//! let labels = DeviceLabels::new("AA:BB:CC:DD:EE:FF", "petkit_fountain");
//! metrics::counter!(metric_defs::FRAMES_SENT.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// How a metric is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Name, kind, unit and label keys of one engine metric.
///
/// Built in const context so every definition lives in [`metric_defs`]:
///
/// ```rust
/// use petkit_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const WRITES: Metric = Metric::counter("petkit.link.writes")
///     .with_description("Frames written")
///     .with_labels(&["device"]);
///
/// assert_eq!(WRITES.kind, MetricKind::Counter);
/// assert_eq!(WRITES.unit, Unit::Count);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    /// Defaults to [`Unit::Count`].
    pub unit: Unit,
    /// Label keys the engine attaches when recording.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: Unit::Count,
            labels: &[],
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Hand the description and unit to whatever recorder is installed.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.description),
            MetricKind::Gauge => describe_gauge!(self.name, self.unit, self.description),
            MetricKind::Histogram => describe_histogram!(self.name, self.unit, self.description),
        }
    }
}

/// All metric definitions for the engine.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Standard Label Keys
    // ========================================================================

    /// Labels present on every device-scoped metric.
    pub const STANDARD_LABELS: &[&str] = &["device", "device_type"];

    // ========================================================================
    // Framing
    // ========================================================================

    /// Frames written to the device.
    ///
    /// Labels: device, device_type, command
    pub const FRAMES_SENT: Metric = Metric::counter("petkit.frames.sent")
        .with_description("Frames written to the device")
        .with_labels(&["device", "device_type", "command"]);

    /// Frames parsed from notifications.
    ///
    /// Labels: device, device_type, command
    pub const FRAMES_RECEIVED: Metric = Metric::counter("petkit.frames.received")
        .with_description("Frames parsed from notifications")
        .with_labels(&["device", "device_type", "command"]);

    /// Notifications discarded because they did not parse.
    ///
    /// Labels: device, device_type, reason
    pub const FRAMES_DROPPED: Metric = Metric::counter("petkit.frames.dropped")
        .with_description("Notifications discarded because they did not parse")
        .with_labels(&["device", "device_type", "reason"]);

    /// Frames that arrived with no request waiting for them.
    ///
    /// Labels: device, device_type, command
    pub const FRAMES_UNSOLICITED: Metric = Metric::counter("petkit.frames.unsolicited")
        .with_description("Frames that arrived with no request waiting for them")
        .with_labels(&["device", "device_type", "command"]);

    // ========================================================================
    // Correlation
    // ========================================================================

    /// Requests that saw no response before their deadline.
    ///
    /// Labels: device, device_type, command
    pub const COMMAND_TIMEOUTS: Metric = Metric::counter("petkit.command.timeouts")
        .with_description("Requests that saw no response before their deadline")
        .with_labels(&["device", "device_type", "command"]);

    /// Retry attempts after a timeout or failed write.
    ///
    /// Labels: device, device_type, command
    pub const COMMAND_RETRIES: Metric = Metric::counter("petkit.command.retries")
        .with_description("Retry attempts after a timeout or failed write")
        .with_labels(&["device", "device_type", "command"]);

    /// Time from write to matching response.
    ///
    /// Labels: device, device_type, command
    pub const COMMAND_ROUND_TRIP: Metric = Metric::histogram("petkit.command.round_trip_ms")
        .with_description("Time from write to matching response in milliseconds")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["device", "device_type", "command"]);

    /// Waits resolved early because the link dropped.
    pub const COMMAND_DISCONNECTED: Metric = Metric::counter("petkit.command.disconnected")
        .with_description("Waits resolved early because the link dropped")
        .with_labels(&["device", "device_type"]);

    // ========================================================================
    // Session
    // ========================================================================

    /// Handshakes that reached the ready state.
    pub const HANDSHAKE_COMPLETED: Metric = Metric::counter("petkit.handshake.completed")
        .with_description("Handshakes that reached the ready state")
        .with_labels(&["device", "device_type"]);

    /// Handshakes that ended in the failed state.
    pub const HANDSHAKE_FAILED: Metric = Metric::counter("petkit.handshake.failed")
        .with_description("Handshakes that ended in the failed state")
        .with_labels(&["device", "device_type"]);

    // ========================================================================
    // Fetch
    // ========================================================================

    /// Completed fetch cycles.
    ///
    /// Labels: device, device_type, outcome (complete|partial|failed)
    pub const FETCH_CYCLES: Metric = Metric::counter("petkit.fetch.cycles")
        .with_description("Completed fetch cycles by outcome")
        .with_labels(&["device", "device_type", "outcome"]);

    /// Number of telemetry fields returned by the last fetch.
    pub const FETCH_FIELDS: Metric = Metric::gauge("petkit.fetch.fields")
        .with_description("Telemetry fields returned by the last fetch")
        .with_labels(&["device", "device_type"]);

    /// All defined metrics.
    pub const ALL: &[&Metric] = &[
        &FRAMES_SENT,
        &FRAMES_RECEIVED,
        &FRAMES_DROPPED,
        &FRAMES_UNSOLICITED,
        &COMMAND_TIMEOUTS,
        &COMMAND_RETRIES,
        &COMMAND_ROUND_TRIP,
        &COMMAND_DISCONNECTED,
        &HANDSHAKE_COMPLETED,
        &HANDSHAKE_FAILED,
        &FETCH_CYCLES,
        &FETCH_FIELDS,
    ];
}

/// Labels identifying one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLabels {
    /// Device address or configured name.
    pub device: String,
    /// Registered device type.
    pub device_type: String,
}

impl DeviceLabels {
    /// Creates labels for a device.
    ///
    /// ```rust
    /// use petkit_metrics::DeviceLabels;
    ///
    /// let labels = DeviceLabels::new("AA:BB:CC:DD:EE:FF", "petkit_fountain");
    /// assert_eq!(labels.device_type, "petkit_fountain");
    /// ```
    pub fn new(device: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            device_type: device_type.into(),
        }
    }

    /// Converts the labels to the `metrics` crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("device", self.device.clone()),
            ("device_type", self.device_type.clone()),
        ]
    }

    /// Standard labels plus extra ones.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }

    /// Standard labels plus a `command` label.
    pub fn with_command(&self, command: u8) -> Vec<(&'static str, String)> {
        self.with(&[("command", command.to_string())])
    }
}

/// Describes all metrics with the installed recorder.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_labels() {
        let labels = DeviceLabels::new("fountain", "petkit_fountain");
        let label_vec = labels.to_labels();
        assert_eq!(label_vec.len(), 2);
        assert!(label_vec.contains(&("device", "fountain".to_string())));
        assert!(label_vec.contains(&("device_type", "petkit_fountain".to_string())));
    }

    #[test]
    fn test_with_command() {
        let labels = DeviceLabels::new("fountain", "petkit_fountain");
        let label_vec = labels.with_command(210);
        assert_eq!(label_vec.len(), 3);
        assert!(label_vec.contains(&("command", "210".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::FRAMES_SENT.name, "petkit.frames.sent");
        assert_eq!(metric_defs::FRAMES_SENT.kind, MetricKind::Counter);
        assert_eq!(metric_defs::COMMAND_ROUND_TRIP.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::FETCH_FIELDS.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::FETCH_FIELDS.unit, Unit::Count);
        assert_eq!(metric_defs::COMMAND_ROUND_TRIP.unit, Unit::Milliseconds);
    }

    #[test]
    fn test_all_names_unique_and_labelled() {
        let all = metric_defs::ALL;
        for (i, a) in all.iter().enumerate() {
            assert!(a.name.starts_with("petkit."));
            assert!(!a.description.is_empty());
            for key in metric_defs::STANDARD_LABELS {
                assert!(a.labels.contains(key), "{} missing label {}", a.name, key);
            }
            for b in &all[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
