//! Run/Fix Store
//!
//! SQLite-backed history shared with the watcher process. The watcher creates
//! and completes runs and inserts fix rows; the dashboard reads them.
//! Location: `/data/watcher.db` unless configured otherwise.

use crate::error::{StoreError, StoreResult};
use crate::models::{Fix, FixStats, NamespaceStats, NewFix, Run, RunCompletion, RunStatus};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a statement waits on the watcher's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RUN_COLUMNS: &str = "id, started_at, COALESCE(ended_at, ''), namespace, \
     COALESCE(mode, ''), COALESCE(status, ''), COALESCE(pod_count, 0), \
     COALESCE(error_count, 0), COALESCE(fix_count, 0), COALESCE(report, ''), COALESCE(log, '')";

const FIX_COLUMNS: &str = "id, COALESCE(run_id, 0), timestamp, namespace, pod_name, error_type, \
     COALESCE(error_message, ''), COALESCE(fix_applied, ''), COALESCE(status, '')";

/// Store handle. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl Store {
    /// Open or create the store at a specific path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Opening watcher database at: {}", path.display());

        let conn = Connection::open(path)?;
        // WAL lets the dashboard read while the watcher writes
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Journal mode: {}", mode);
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests
    pub fn open_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                namespace TEXT NOT NULL,
                mode TEXT NOT NULL DEFAULT 'autonomous',
                status TEXT NOT NULL DEFAULT 'running',
                pod_count INTEGER DEFAULT 0,
                error_count INTEGER DEFAULT 0,
                fix_count INTEGER DEFAULT 0,
                report TEXT,
                log TEXT
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS fixes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER,
                timestamp TEXT NOT NULL,
                namespace TEXT NOT NULL,
                pod_name TEXT NOT NULL,
                error_type TEXT NOT NULL,
                error_message TEXT,
                fix_applied TEXT,
                status TEXT DEFAULT 'pending',
                FOREIGN KEY (run_id) REFERENCES runs(id)
            )
            "#,
            [],
        )?;

        // Databases created before fixes were linked to runs lack run_id
        add_run_id_column(&conn);

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_runs_namespace_started ON runs(namespace, started_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_fixes_run ON fixes(run_id)",
            [],
        )?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Start a run; returns its id
    pub fn create_run(&self, namespace: &str, mode: &str) -> StoreResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO runs (started_at, namespace, mode, status)
            VALUES (datetime('now'), ?1, ?2, ?3)
            "#,
            params![namespace, mode, RunStatus::Running.as_str()],
        )?;
        let id = conn.last_insert_rowid();
        debug!(run_id = id, namespace, "Created run");
        Ok(id)
    }

    /// Record the outcome of a run. An unknown id matches no rows and is not an error.
    pub fn complete_run(&self, id: i64, completion: &RunCompletion) -> StoreResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            r#"
            UPDATE runs SET
                ended_at = datetime('now'),
                status = ?1,
                pod_count = ?2,
                error_count = ?3,
                fix_count = ?4,
                report = ?5,
                log = ?6
            WHERE id = ?7
            "#,
            params![
                completion.status.as_str(),
                completion.pod_count,
                completion.error_count,
                completion.fix_count,
                &completion.report,
                &completion.log,
                id
            ],
        )?;
        debug!(run_id = id, updated, status = %completion.status, "Completed run");
        Ok(())
    }

    /// Most recent runs first. An empty namespace matches every namespace.
    pub fn get_runs(&self, namespace: &str, limit: usize) -> StoreResult<Vec<Run>> {
        let conn = self.lock()?;

        let mut sql = format!("SELECT {} FROM runs", RUN_COLUMNS);
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        if !namespace.is_empty() {
            sql.push_str(" WHERE namespace = ?");
            params_vec.push(Box::new(namespace.to_string()));
        }

        sql.push_str(" ORDER BY started_at DESC, id DESC LIMIT ?");
        params_vec.push(Box::new(sql_limit(limit)));

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), run_from_row)?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }

    pub fn get_run(&self, id: i64) -> StoreResult<Run> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
            params![id],
            run_from_row,
        )
        .optional()?
        .ok_or(StoreError::RunNotFound(id))
    }

    /// Latest completion time among finished runs, empty if none
    pub fn get_last_run_time(&self, namespace: &str) -> StoreResult<String> {
        let conn = self.lock()?;
        let last: String = conn.query_row(
            "SELECT COALESCE(MAX(ended_at), '') FROM runs WHERE namespace = ?1 AND status != ?2",
            params![namespace, RunStatus::Running.as_str()],
            |row| row.get(0),
        )?;
        Ok(last)
    }

    // ------------------------------------------------------------------
    // Namespaces
    // ------------------------------------------------------------------

    /// One row per namespace, ordered by name
    pub fn get_namespaces(&self) -> StoreResult<Vec<NamespaceStats>> {
        let conn = self.lock()?;
        let sql = format!(
            r#"
            SELECT
                namespace,
                COUNT(*),
                SUM(CASE WHEN {ok} THEN 1 ELSE 0 END),
                SUM(CASE WHEN {fixed} THEN 1 ELSE 0 END),
                SUM(CASE WHEN {failed} THEN 1 ELSE 0 END)
            FROM runs
            GROUP BY namespace
            ORDER BY namespace
            "#,
            ok = status_filter(|s| *s == RunStatus::Ok),
            fixed = status_filter(|s| *s == RunStatus::Fixed),
            failed = status_filter(RunStatus::needs_attention),
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt.query_map([], |row| {
            Ok(NamespaceStats {
                namespace: row.get(0)?,
                run_count: row.get(1)?,
                ok_count: row.get(2)?,
                fixed_count: row.get(3)?,
                failed_count: row.get(4)?,
            })
        })?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }
        Ok(stats)
    }

    pub fn get_namespace_stats(&self, namespace: &str) -> StoreResult<NamespaceStats> {
        let conn = self.lock()?;

        let count = |filter: &str| -> StoreResult<i64> {
            let sql = format!("SELECT COUNT(*) FROM runs WHERE namespace = ?1 AND {}", filter);
            Ok(conn.query_row(&sql, params![namespace], |row| row.get(0))?)
        };

        Ok(NamespaceStats {
            namespace: namespace.to_string(),
            run_count: count("1")?,
            ok_count: count(&status_filter(|s| *s == RunStatus::Ok))?,
            fixed_count: count(&status_filter(|s| *s == RunStatus::Fixed))?,
            failed_count: count(&status_filter(RunStatus::needs_attention))?,
        })
    }

    // ------------------------------------------------------------------
    // Fixes
    // ------------------------------------------------------------------

    /// Insert a fix row the way the watcher does
    pub fn record_fix(&self, fix: &NewFix) -> StoreResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO fixes (run_id, timestamp, namespace, pod_name, error_type, error_message, fix_applied, status)
            VALUES (?1, datetime('now'), ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                fix.run_id,
                &fix.namespace,
                &fix.pod_name,
                &fix.error_type,
                &fix.error_message,
                &fix.fix_applied,
                &fix.status
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent fixes across all namespaces
    pub fn get_fixes(&self, limit: usize) -> StoreResult<Vec<Fix>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM fixes ORDER BY timestamp DESC, id DESC LIMIT ?1",
            FIX_COLUMNS
        ))?;
        let rows = stmt.query_map(params![sql_limit(limit)], fix_from_row)?;

        let mut fixes = Vec::new();
        for row in rows {
            fixes.push(row?);
        }
        Ok(fixes)
    }

    pub fn get_fixes_by_run(&self, run_id: i64) -> StoreResult<Vec<Fix>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM fixes WHERE run_id = ?1 ORDER BY timestamp DESC, id DESC",
            FIX_COLUMNS
        ))?;
        let rows = stmt.query_map(params![run_id], fix_from_row)?;

        let mut fixes = Vec::new();
        for row in rows {
            fixes.push(row?);
        }
        Ok(fixes)
    }

    pub fn get_stats(&self) -> StoreResult<FixStats> {
        let conn = self.lock()?;

        let count = |sql: &str| -> StoreResult<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

        Ok(FixStats {
            total: count("SELECT COUNT(*) FROM fixes")?,
            success: count("SELECT COUNT(*) FROM fixes WHERE status = 'success'")?,
            failed: count("SELECT COUNT(*) FROM fixes WHERE status = 'failed'")?,
            pending: count("SELECT COUNT(*) FROM fixes WHERE status = 'pending' OR status = 'analyzing'")?,
        })
    }
}

fn add_run_id_column(conn: &Connection) {
    let exists = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('fixes') WHERE name = 'run_id'",
            [],
            |row| {
                let count: i64 = row.get(0)?;
                Ok(count > 0)
            },
        )
        .unwrap_or(false);

    if exists {
        return;
    }

    info!("Running migration: Adding run_id column to fixes");
    match conn.execute("ALTER TABLE fixes ADD COLUMN run_id INTEGER", []) {
        Ok(_) => info!("Migration complete: Added run_id to fixes"),
        Err(e) => warn!("Skipping run_id migration on fixes: {}", e),
    }
}

/// `status IN (...)` over the run statuses matching `pred`
fn status_filter<F>(pred: F) -> String
where
    F: Fn(&RunStatus) -> bool,
{
    let statuses: Vec<String> = RunStatus::ALL
        .iter()
        .filter(|s| pred(*s))
        .map(|s| format!("'{}'", s.as_str()))
        .collect();
    format!("status IN ({})", statuses.join(", "))
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        started_at: row.get(1)?,
        ended_at: row.get(2)?,
        namespace: row.get(3)?,
        mode: row.get(4)?,
        status: row.get(5)?,
        pod_count: row.get(6)?,
        error_count: row.get(7)?,
        fix_count: row.get(8)?,
        report: row.get(9)?,
        log: row.get(10)?,
    })
}

fn fix_from_row(row: &Row<'_>) -> rusqlite::Result<Fix> {
    Ok(Fix {
        id: row.get(0)?,
        run_id: row.get(1)?,
        timestamp: row.get(2)?,
        namespace: row.get(3)?,
        pod_name: row.get(4)?,
        error_type: row.get(5)?,
        error_message: row.get(6)?,
        fix_applied: row.get(7)?,
        status: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_MODE;
    use tempfile::tempdir;

    fn completion(status: RunStatus) -> RunCompletion {
        RunCompletion {
            status,
            pod_count: 0,
            error_count: 0,
            fix_count: 0,
            report: String::new(),
            log: String::new(),
        }
    }

    #[test]
    fn test_create_run_starts_running() {
        let store = Store::open_memory().unwrap();
        let id = store.create_run("default", DEFAULT_MODE).unwrap();

        let run = store.get_run(id).unwrap();
        assert_eq!(run.id, id);
        assert_eq!(run.status, "running");
        assert_eq!(run.ended_at, "");
        assert_eq!(run.mode, "autonomous");
        assert!(!run.started_at.is_empty());
    }

    #[test]
    fn test_complete_run_sets_outcome() {
        let store = Store::open_memory().unwrap();
        let id = store.create_run("default", DEFAULT_MODE).unwrap();

        store
            .complete_run(
                id,
                &RunCompletion {
                    status: RunStatus::Fixed,
                    pod_count: 3,
                    error_count: 1,
                    fix_count: 1,
                    report: "Restarted api-0".to_string(),
                    log: "scan complete".to_string(),
                },
            )
            .unwrap();

        let run = store.get_run(id).unwrap();
        assert_eq!(run.status, "fixed");
        assert_eq!(run.pod_count, 3);
        assert_eq!(run.error_count, 1);
        assert_eq!(run.fix_count, 1);
        assert!(!run.ended_at.is_empty());
        assert_eq!(run.report, "Restarted api-0");
        assert_eq!(run.log, "scan complete");
    }

    #[test]
    fn test_complete_unknown_run_is_noop() {
        let store = Store::open_memory().unwrap();
        store.complete_run(999, &completion(RunStatus::Ok)).unwrap();
        assert!(store.get_runs("", 10).unwrap().is_empty());
    }

    #[test]
    fn test_get_run_not_found() {
        let store = Store::open_memory().unwrap();
        let err = store.get_run(42).unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, StoreError::RunNotFound(42)));
    }

    #[test]
    fn test_namespace_stats_counts() {
        let store = Store::open_memory().unwrap();
        for status in [RunStatus::Ok, RunStatus::Fixed, RunStatus::Failed] {
            let id = store.create_run("ns-a", DEFAULT_MODE).unwrap();
            store.complete_run(id, &completion(status)).unwrap();
        }
        store.create_run("ns-b", DEFAULT_MODE).unwrap();

        let stats = store.get_namespace_stats("ns-a").unwrap();
        assert_eq!(stats.namespace, "ns-a");
        assert_eq!(stats.run_count, 3);
        assert_eq!(stats.ok_count, 1);
        assert_eq!(stats.fixed_count, 1);
        assert_eq!(stats.failed_count, 1);
    }

    #[test]
    fn test_failed_filter_follows_run_status() {
        assert_eq!(
            status_filter(RunStatus::needs_attention),
            "status IN ('failed', 'issues_found')"
        );
        assert_eq!(status_filter(|s| *s == RunStatus::Ok), "status IN ('ok')");
    }

    #[test]
    fn test_namespace_stats_issues_found_counts_as_failed() {
        let store = Store::open_memory().unwrap();
        let id = store.create_run("ns-a", DEFAULT_MODE).unwrap();
        store.complete_run(id, &completion(RunStatus::IssuesFound)).unwrap();

        let stats = store.get_namespace_stats("ns-a").unwrap();
        assert_eq!(stats.failed_count, 1);

        let empty = store.get_namespace_stats("nowhere").unwrap();
        assert_eq!(empty.run_count, 0);
    }

    #[test]
    fn test_last_run_time_ignores_running() {
        let store = Store::open_memory().unwrap();
        store.create_run("ns-a", DEFAULT_MODE).unwrap();
        assert_eq!(store.get_last_run_time("ns-a").unwrap(), "");

        let id = store.create_run("ns-a", DEFAULT_MODE).unwrap();
        store.complete_run(id, &completion(RunStatus::Ok)).unwrap();
        let ended = store.get_run(id).unwrap().ended_at;
        assert_eq!(store.get_last_run_time("ns-a").unwrap(), ended);
    }

    #[test]
    fn test_fix_stats() {
        let store = Store::open_memory().unwrap();
        let run = store.create_run("ns-a", DEFAULT_MODE).unwrap();
        for status in ["success", "success", "failed", "pending", "analyzing"] {
            store
                .record_fix(&NewFix::new(run, "ns-a", "pod", "OOMKilled").with_status(status))
                .unwrap();
        }

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 2);
    }

    #[test]
    fn test_migration_adds_run_id_column() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("legacy.db");

        // Fixes table from before runs existed
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute(
                "CREATE TABLE fixes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    namespace TEXT NOT NULL,
                    pod_name TEXT NOT NULL,
                    error_type TEXT NOT NULL,
                    error_message TEXT,
                    fix_applied TEXT,
                    status TEXT DEFAULT 'pending'
                )",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO fixes (timestamp, namespace, pod_name, error_type, status)
                 VALUES ('2025-11-01 10:00:00', 'legacy', 'web-1', 'ImagePullBackOff', 'success')",
                [],
            )
            .unwrap();
        }

        let store = Store::open(&db_path).unwrap();
        let fixes = store.get_fixes(10).unwrap();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].run_id, 0);
        assert_eq!(fixes[0].error_message, "");
        assert_eq!(fixes[0].fix_applied, "");

        // Reopening must not fail now that the column exists
        drop(store);
        Store::open(&db_path).unwrap();
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("data").join("watcher.db");

        let store = Store::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.path(), Some(db_path.as_path()));
    }
}
