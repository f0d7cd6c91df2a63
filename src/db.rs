//! SQLite database with Diesel ORM
//!
//! Keeps a log of every analysis: one row per report with the verdict,
//! the aggregate confidence and the per-layer scores as JSON. The schema
//! is created on open, so a fresh path is a valid database.

use crate::analyzer::{AggregateReport, Verdict};
use crate::schema::*;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::collections::BTreeMap;
use std::path::Path;

/// Upper bound on one history page.
pub const MAX_HISTORY_LIMIT: i64 = 500;

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable analysis log entry
#[derive(Insertable)]
#[diesel(table_name = analysis_logs)]
pub struct NewAnalysisLog<'a> {
    pub filename: &'a str,
    pub media_type: &'a str,
    pub verdict: &'a str,
    pub confidence: f64,
    pub layer_scores_json: &'a str,
    pub explanation: &'a str,
    pub analyzed_at: &'a str,
}

/// Queryable analysis log entry (database record)
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = analysis_logs)]
pub struct DbRecord {
    pub id: i32,
    pub filename: String,
    pub media_type: String,
    pub verdict: String,
    pub confidence: f64,
    pub layer_scores_json: String,
    pub explanation: String,
    pub analyzed_at: String,
}

impl DbRecord {
    /// Decoded `layer_scores_json`; a corrupt column reads as empty.
    pub fn layer_scores(&self) -> BTreeMap<String, f64> {
        serde_json::from_str(&self.layer_scores_json).unwrap_or_default()
    }
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
}

/// Error type for database operations
#[derive(Debug)]
pub enum DbError {
    Connection(String),
    Query(diesel::result::Error),
    Pool(diesel::r2d2::Error),
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::Connection(msg) => write!(f, "Connection error: {}", msg),
            DbError::Query(e) => write!(f, "Query error: {}", e),
            DbError::Pool(e) => write!(f, "Pool error: {}", e),
        }
    }
}

impl std::error::Error for DbError {}

impl From<diesel::result::Error> for DbError {
    fn from(e: diesel::result::Error) -> Self {
        DbError::Query(e)
    }
}

impl From<diesel::r2d2::Error> for DbError {
    fn from(e: diesel::r2d2::Error) -> Self {
        DbError::Pool(e)
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Helper for raw SQL avg query
#[derive(QueryableByName)]
struct AvgResult {
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Double>)]
    avg: Option<f64>,
}

impl Database {
    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(5)
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS analysis_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                filename TEXT NOT NULL,
                media_type TEXT NOT NULL,
                verdict TEXT NOT NULL,
                confidence REAL NOT NULL,
                layer_scores_json TEXT NOT NULL,
                explanation TEXT NOT NULL DEFAULT '',
                analyzed_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_logs_verdict ON analysis_logs(verdict)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_logs_analyzed_at ON analysis_logs(analyzed_at)").execute(&mut conn)?;

        Ok(())
    }

    // ========================================================================
    // Analysis Logs
    // ========================================================================

    /// Store one report and return its row id
    pub fn insert_report(&self, report: &AggregateReport) -> Result<i32> {
        let mut conn = self.get_conn()?;
        let now = chrono::Local::now().to_rfc3339();

        let scores_json = serde_json::to_string(&report.layer_scores).unwrap_or_else(|_| "{}".to_string());
        let media_type = report.media_type.map(|k| k.as_str()).unwrap_or("unknown");

        let new_log = NewAnalysisLog {
            filename: &report.file_name,
            media_type,
            verdict: report.verdict.as_str(),
            confidence: report.confidence,
            layer_scores_json: &scores_json,
            explanation: &report.explanation,
            analyzed_at: &now,
        };

        diesel::insert_into(analysis_logs::table)
            .values(&new_log)
            .execute(&mut conn)?;

        let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
            .first(&mut conn)?;

        Ok(id)
    }

    /// One page of history, newest first. Row ids follow insertion order.
    pub fn get_history(&self, skip: i64, limit: i64) -> Result<Vec<DbRecord>> {
        let mut conn = self.get_conn()?;
        let records = analysis_logs::table
            .order(analysis_logs::id.desc())
            .offset(skip.max(0))
            .limit(limit.clamp(0, MAX_HISTORY_LIMIT))
            .load::<DbRecord>(&mut conn)?;
        Ok(records)
    }

    /// Get summary statistics
    pub fn get_summary(&self) -> Result<DbSummary> {
        let mut conn = self.get_conn()?;

        let count_of = |conn: &mut DbConn, verdict: Verdict| -> Result<i64> {
            let n = analysis_logs::table
                .filter(analysis_logs::verdict.eq(verdict.as_str()))
                .count()
                .get_result(conn)?;
            Ok(n)
        };

        let total: i64 = analysis_logs::table.count().get_result(&mut conn)?;
        let real_count = count_of(&mut conn, Verdict::Real)?;
        let suspicious_count = count_of(&mut conn, Verdict::Suspicious)?;
        let ai_generated_count = count_of(&mut conn, Verdict::AIGenerated)?;

        // Use raw SQL for avg since Diesel's avg returns Numeric type
        let avg_confidence: Option<f64> = diesel::sql_query("SELECT AVG(confidence) as avg FROM analysis_logs")
            .get_result::<AvgResult>(&mut conn)
            .ok()
            .and_then(|r| r.avg);

        Ok(DbSummary {
            total: total as i32,
            real_count: real_count as i32,
            suspicious_count: suspicious_count as i32,
            ai_generated_count: ai_generated_count as i32,
            avg_confidence,
        })
    }

    /// Clear all analysis records
    pub fn clear(&self) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let count = diesel::delete(analysis_logs::table).execute(&mut conn)?;
        Ok(count)
    }
}

// ============================================================================
// Additional Types
// ============================================================================

/// Summary statistics from the database
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbSummary {
    pub total: i32,
    pub real_count: i32,
    pub suspicious_count: i32,
    pub ai_generated_count: i32,
    pub avg_confidence: Option<f64>,
}
