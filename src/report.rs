//! Run Report
//!
//! Tracks every exported item from the moment its source announces it
//! until the pipeline writes (or fails to write) its document, and
//! summarizes the outcome per resource type.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

/// Final status of one exported item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    /// Announced by its source, not finished yet
    Pending,
    /// Document written to `file_path`
    Succeeded { file_path: String },
    /// Document failed with the given error text
    Failed { error: String },
}

impl ItemStatus {
    /// Status marker used in the run summary
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Pending => "◯",
            Self::Succeeded { .. } => "✓",
            Self::Failed { .. } => "✗",
        }
    }
}

/// Emitted when a source announces an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRecord {
    pub workspace_url: String,
    pub item_id: String,
    pub resource_type: String,
    pub api_id: String,
    pub display_name: String,
}

/// Emitted when the pipeline is done with an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndRecord {
    pub item_id: String,
    pub resource_type: String,
    pub status: ItemStatus,
}

/// Receiver of per-item progress events
pub trait EventSink: Send + Sync {
    fn start(&self, record: StartRecord);
    fn end(&self, record: EndRecord);
}

/// One row of the report
#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub workspace_url: String,
    pub item_id: String,
    pub api_id: String,
    pub display_name: String,
    pub resource_type: String,
    pub status: ItemStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Records {
    rows: Vec<ReportRecord>,
    index: HashMap<(String, String), usize>,
}

/// In-process report store
pub struct MemoryReport {
    run_id: Uuid,
    records: Mutex<Records>,
}

impl Default for MemoryReport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReport {
    /// Empty report with a fresh run id
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            records: Mutex::new(Records::default()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Snapshot of every row in announcement order
    pub fn records(&self) -> Vec<ReportRecord> {
        self.records
            .lock()
            .map(|r| r.rows.clone())
            .unwrap_or_default()
    }

    /// Look up the record of one item
    pub fn get(&self, item_id: &str, resource_type: &str) -> Option<ReportRecord> {
        let records = self.records.lock().ok()?;
        let pos = *records
            .index
            .get(&(item_id.to_string(), resource_type.to_string()))?;
        records.rows.get(pos).cloned()
    }

    /// Counts per resource type plus the failed items
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for record in self.records() {
            let tally = summary.by_type.entry(record.resource_type.clone()).or_default();
            match &record.status {
                ItemStatus::Pending => tally.pending += 1,
                ItemStatus::Succeeded { .. } => tally.succeeded += 1,
                ItemStatus::Failed { error } => {
                    tally.failed += 1;
                    summary.failures.push(FailedItem {
                        resource_type: record.resource_type.clone(),
                        item_id: record.item_id.clone(),
                        display_name: record.display_name.clone(),
                        error: error.clone(),
                    });
                }
            }
        }
        summary
    }
}

impl EventSink for MemoryReport {
    fn start(&self, record: StartRecord) {
        let Ok(mut guard) = self.records.lock() else {
            return;
        };
        let Records { rows: records, index } = &mut *guard;
        let row = ReportRecord {
            id: Uuid::new_v4(),
            run_id: self.run_id,
            workspace_url: record.workspace_url,
            item_id: record.item_id.clone(),
            api_id: record.api_id,
            display_name: record.display_name,
            resource_type: record.resource_type.clone(),
            status: ItemStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
        };
        let key = (record.item_id, record.resource_type);
        match index.get(&key) {
            Some(&pos) => records[pos] = row,
            None => {
                index.insert(key, records.len());
                records.push(row);
            }
        }
    }

    fn end(&self, record: EndRecord) {
        let Ok(mut guard) = self.records.lock() else {
            return;
        };
        let Records { rows: records, index } = &mut *guard;
        let key = (record.item_id.clone(), record.resource_type.clone());
        let pos = match index.get(&key) {
            Some(&pos) => pos,
            None => {
                // Items that failed before being announced still get a row
                records.push(ReportRecord {
                    id: Uuid::new_v4(),
                    run_id: self.run_id,
                    workspace_url: String::new(),
                    item_id: record.item_id.clone(),
                    api_id: record.item_id.clone(),
                    display_name: record.item_id.clone(),
                    resource_type: record.resource_type.clone(),
                    status: ItemStatus::Pending,
                    started_at: Utc::now(),
                    ended_at: None,
                });
                index.insert(key, records.len() - 1);
                records.len() - 1
            }
        };
        records[pos].status = record.status;
        records[pos].ended_at = Some(Utc::now());
    }
}

/// Per resource type counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub resource_type: String,
    pub item_id: String,
    pub display_name: String,
    pub error: String,
}

/// Outcome of a run as shown to the user
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub by_type: BTreeMap<String, Tally>,
    pub failures: Vec<FailedItem>,
}

impl RunSummary {
    pub fn total_failed(&self) -> usize {
        self.by_type.values().map(|t| t.failed).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<40} {:>10} {:>8}", "RESOURCE TYPE", "SUCCEEDED", "FAILED")?;
        for (resource_type, tally) in &self.by_type {
            writeln!(
                f,
                "{:<40} {:>10} {:>8}",
                resource_type, tally.succeeded, tally.failed
            )?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "{} {} {} ({}): {}",
                ItemStatus::Failed {
                    error: String::new()
                }
                .icon(),
                failure.resource_type,
                failure.display_name,
                failure.item_id,
                failure.error
            )?;
        }
        Ok(())
    }
}
