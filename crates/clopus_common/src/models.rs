//! Run and fix records as stored by the watcher.
//!
//! Nullable columns are coalesced to empty strings or zero when rows are read,
//! so none of these types carry `Option` fields.

use serde::{Deserialize, Serialize};

/// Default watcher mode for new runs
pub const DEFAULT_MODE: &str = "autonomous";

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Watcher is still scanning the namespace
    Running,
    /// No problems found
    Ok,
    /// Problems found and remediated
    Fixed,
    /// Remediation was attempted and failed
    Failed,
    /// Problems found but left for a human
    IssuesFound,
}

impl RunStatus {
    pub const ALL: [RunStatus; 5] = [
        RunStatus::Running,
        RunStatus::Ok,
        RunStatus::Fixed,
        RunStatus::Failed,
        RunStatus::IssuesFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Ok => "ok",
            RunStatus::Fixed => "fixed",
            RunStatus::Failed => "failed",
            RunStatus::IssuesFound => "issues_found",
        }
    }

    /// Parse a stored status. Unknown values yield `None`; the raw string is
    /// still kept on the [`Run`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "ok" => Some(RunStatus::Ok),
            "fixed" => Some(RunStatus::Fixed),
            "failed" => Some(RunStatus::Failed),
            "issues_found" => Some(RunStatus::IssuesFound),
            _ => None,
        }
    }

    /// Statuses counted as "failed" in namespace aggregates
    pub fn needs_attention(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::IssuesFound)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One watcher execution against a namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub started_at: String,
    /// Empty while the run is in progress
    pub ended_at: String,
    pub namespace: String,
    pub mode: String,
    pub status: String,
    pub pod_count: i64,
    pub error_count: i64,
    pub fix_count: i64,
    pub report: String,
    pub log: String,
}

impl Run {
    pub fn status_kind(&self) -> Option<RunStatus> {
        RunStatus::parse(&self.status)
    }
}

/// Final values written when a run completes
#[derive(Debug, Clone, PartialEq)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub pod_count: i64,
    pub error_count: i64,
    pub fix_count: i64,
    pub report: String,
    pub log: String,
}

/// One remediation action taken on a pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub id: i64,
    /// 0 for legacy rows recorded before fixes were linked to runs
    pub run_id: i64,
    pub timestamp: String,
    pub namespace: String,
    pub pod_name: String,
    pub error_type: String,
    pub error_message: String,
    pub fix_applied: String,
    pub status: String,
}

/// A fix row as inserted by the watcher
#[derive(Debug, Clone, PartialEq)]
pub struct NewFix {
    pub run_id: Option<i64>,
    pub namespace: String,
    pub pod_name: String,
    pub error_type: String,
    pub error_message: Option<String>,
    pub fix_applied: Option<String>,
    pub status: String,
}

impl NewFix {
    pub fn new(
        run_id: i64,
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Some(run_id),
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            error_type: error_type.into(),
            error_message: None,
            fix_applied: None,
            status: "pending".to_string(),
        }
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_fix_applied(mut self, fix: impl Into<String>) -> Self {
        self.fix_applied = Some(fix.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

/// Aggregate run counts for one namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub run_count: i64,
    pub ok_count: i64,
    pub fixed_count: i64,
    /// Runs that ended `failed` or `issues_found`
    pub failed_count: i64,
}

/// Global fix counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixStats {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    /// `pending` and `analyzing` fixes
    pub pending: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_parse() {
        for status in RunStatus::ALL {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("exploded"), None);
    }

    #[test]
    fn test_run_status_attention() {
        assert!(RunStatus::Failed.needs_attention());
        assert!(RunStatus::IssuesFound.needs_attention());
        assert!(!RunStatus::Fixed.needs_attention());
        assert!(!RunStatus::Running.needs_attention());
    }

    #[test]
    fn test_run_json_field_names() {
        let run = Run {
            id: 7,
            started_at: "2026-01-01 10:00:00".to_string(),
            ended_at: String::new(),
            namespace: "default".to_string(),
            mode: DEFAULT_MODE.to_string(),
            status: "running".to_string(),
            pod_count: 0,
            error_count: 0,
            fix_count: 0,
            report: String::new(),
            log: String::new(),
        };

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["ended_at"], "");
        assert_eq!(json["namespace"], "default");
        assert_eq!(run.status_kind(), Some(RunStatus::Running));
    }

    #[test]
    fn test_new_fix_builder() {
        let fix = NewFix::new(3, "prod", "api-0", "CrashLoopBackOff")
            .with_error_message("exit code 137")
            .with_status("success");
        assert_eq!(fix.run_id, Some(3));
        assert_eq!(fix.error_message.as_deref(), Some("exit code 137"));
        assert_eq!(fix.fix_applied, None);
        assert_eq!(fix.status, "success");
    }
}
