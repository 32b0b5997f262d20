//! Progress reporting module for scan operations
//!
//! This module provides data structures and utilities for reporting
//! scan progress to external callers as JSON lines on stderr.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::ScanConfig;
use crate::models::ScanReport;

/// Callback receiving `(processed, total)`
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    /// Waiting for a scan to start
    #[default]
    Idle,
    /// Walking the directory tree
    Discovering,
    /// Reconciling batches against the catalog
    Processing,
    /// Computing totals
    Finalizing,
    Done,
}

impl ScanPhase {
    /// Get string representation of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Discovering => "discovering",
            ScanPhase::Processing => "processing",
            ScanPhase::Finalizing => "finalizing",
            ScanPhase::Done => "done",
        }
    }
}

/// Start message sent when scan begins
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Message type identifier
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    pub root: String,
    pub recursive: bool,
    pub include_hidden: bool,
    pub incremental: bool,
    pub workers: usize,
}

/// Progress message sent during scan
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    /// Message type identifier ("p" for progress)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    pub phase: ScanPhase,
    pub processed: u64,
    pub total: u64,
}

/// Error message sent for a failed file
#[derive(Debug, Clone, Serialize)]
pub struct ErrorProgressMessage {
    /// Message type identifier ("err" for error)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    pub message: String,
}

/// Done message sent when scan completes
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    /// Message type identifier ("done" for completion)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    #[serde(rename = "tf")]
    pub total_files: u64,
    #[serde(rename = "nf")]
    pub new_files: u64,
    #[serde(rename = "uf")]
    pub updated_files: u64,
    #[serde(rename = "sf")]
    pub skipped_files: u64,
    #[serde(rename = "ef")]
    pub error_files: u64,
    /// Total bytes seen
    pub bytes: u64,
    /// Scan duration in milliseconds
    pub ms: u64,
}

/// Progress reporter for outputting scan progress to stderr
///
/// Handles timing, sequence numbers, and formatting of the message types.
/// Intermediate progress messages are throttled to `interval_ms`; the final
/// one (`processed == total`) always goes out.
pub struct ProgressReporter {
    enabled: bool,
    interval_ms: u64,
    last_report: Mutex<Option<Instant>>,
    seq: AtomicU64,
    start_time: Instant,
}

impl ProgressReporter {
    /// Create a new ProgressReporter
    ///
    /// # Arguments
    /// * `enabled` - Whether progress reporting is enabled
    /// * `interval_ms` - Minimum interval between progress messages in milliseconds
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        Self {
            enabled,
            interval_ms,
            last_report: Mutex::new(None),
            seq: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Check if the reporter is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether enough time has passed since the last progress message
    pub fn should_report(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_report.lock() {
            Ok(last) => last.map_or(true, |t| t.elapsed().as_millis() as u64 >= self.interval_ms),
            Err(_) => true,
        }
    }

    /// Get the next sequence number (monotonically increasing)
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Output a serializable message to stderr as JSON
    pub fn output_to_stderr<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            eprintln!("{}", json);
            std::io::stderr().flush().ok();
        }
    }

    pub fn report_start(&self, config: &ScanConfig) {
        if !self.enabled {
            return;
        }
        let msg = StartMessage {
            msg_type: "start",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            root: config.root.to_string_lossy().to_string(),
            recursive: config.recursive,
            include_hidden: config.include_hidden,
            incremental: config.incremental,
            workers: config.effective_workers(),
        };
        self.output_to_stderr(&msg);
    }

    /// Report progress; returns true if a message was actually sent
    pub fn report_progress(&self, phase: ScanPhase, processed: u64, total: u64) -> bool {
        if !self.enabled {
            return false;
        }
        if processed < total && !self.should_report() {
            return false;
        }

        let msg = ProgressMessage {
            msg_type: "p",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            phase,
            processed,
            total,
        };
        self.output_to_stderr(&msg);
        if let Ok(mut last) = self.last_report.lock() {
            *last = Some(Instant::now());
        }
        true
    }

    /// Report a failed file immediately
    pub fn report_error(&self, message: &str) {
        if !self.enabled {
            return;
        }
        let msg = ErrorProgressMessage {
            msg_type: "err",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            message: message.to_string(),
        };
        self.output_to_stderr(&msg);
    }

    pub fn report_done(&self, report: &ScanReport) {
        if !self.enabled {
            return;
        }
        let msg = DoneMessage {
            msg_type: "done",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            total_files: report.total_files,
            new_files: report.new_files,
            updated_files: report.updated_files,
            skipped_files: report.skipped_files,
            error_files: report.error_files,
            bytes: report.total_size,
            ms: report.duration_ms,
        };
        self.output_to_stderr(&msg);
    }

    /// Adapt the reporter to the orchestrator's callback shape
    pub fn callback(reporter: Arc<Self>) -> ProgressCallback {
        Box::new(move |processed, total| {
            reporter.report_progress(ScanPhase::Processing, processed, total);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_scan_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&ScanPhase::Discovering).unwrap(),
            "\"discovering\""
        );
        assert_eq!(
            serde_json::to_string(&ScanPhase::Finalizing).unwrap(),
            "\"finalizing\""
        );
        assert_eq!(ScanPhase::Processing.as_str(), "processing");
        assert_eq!(ScanPhase::default(), ScanPhase::Idle);
    }

    #[test]
    fn test_progress_message_serialization() {
        let msg = ProgressMessage {
            msg_type: "p",
            seq: 2,
            ts: 200,
            phase: ScanPhase::Processing,
            processed: 100,
            total: 250,
        };
        let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(parsed["_t"], "p");
        assert_eq!(parsed["phase"], "processing");
        assert_eq!(parsed["processed"], 100);
        assert_eq!(parsed["total"], 250);
    }

    #[test]
    fn test_done_message_serialization() {
        let msg = DoneMessage {
            msg_type: "done",
            seq: 10,
            ts: 5000,
            total_files: 11,
            new_files: 10,
            updated_files: 0,
            skipped_files: 0,
            error_files: 1,
            bytes: 4096,
            ms: 4500,
        };
        let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(parsed["_t"], "done");
        assert_eq!(parsed["tf"], 11);
        assert_eq!(parsed["nf"], 10);
        assert_eq!(parsed["ef"], 1);
        assert_eq!(parsed["bytes"], 4096);
    }

    #[test]
    fn test_sequence_numbers() {
        let reporter = ProgressReporter::new(true, 200);
        assert_eq!(reporter.next_seq(), 0);
        assert_eq!(reporter.next_seq(), 1);
        assert_eq!(reporter.next_seq(), 2);
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        let reporter = ProgressReporter::new(false, 0);
        assert!(!reporter.is_enabled());
        assert!(!reporter.should_report());
        assert!(!reporter.report_progress(ScanPhase::Processing, 5, 5));
        reporter.report_start(&ScanConfig::default());
        reporter.report_error("boom");
        reporter.report_done(&ScanReport::default());
        // Nothing consumed a sequence number
        assert_eq!(reporter.next_seq(), 0);
    }

    #[test]
    fn test_throttling_and_final_message() {
        let reporter = ProgressReporter::new(true, 60_000);
        assert!(reporter.report_progress(ScanPhase::Processing, 100, 1000));
        // Within the interval: intermediate updates are dropped
        assert!(!reporter.report_progress(ScanPhase::Processing, 200, 1000));
        // Completion always goes out
        assert!(reporter.report_progress(ScanPhase::Processing, 1000, 1000));
    }

    #[test]
    fn test_interval_elapses() {
        let reporter = ProgressReporter::new(true, 10);
        assert!(reporter.report_progress(ScanPhase::Processing, 1, 10));
        assert!(!reporter.should_report());
        std::thread::sleep(Duration::from_millis(20));
        assert!(reporter.should_report());
    }

    #[test]
    fn test_callback_forwards() {
        let reporter = Arc::new(ProgressReporter::new(true, 60_000));
        let callback = ProgressReporter::callback(Arc::clone(&reporter));
        callback(3, 3);
        assert_eq!(reporter.next_seq(), 1);
    }
}
