//! HTTP server for upload-and-analyse mode
//!
//! `fakescope serve` → listens on the configured host/port, accepts raw
//! uploads, runs the pipeline and logs every report to the database.
//!
//! Routing is kept apart from `tiny_http` so handlers can be exercised
//! directly with an in-memory body.

use crate::analyzer::{AggregateReport, Orchestrator};
use crate::config::Settings;
use crate::db::{Database, DbRecord};
use crate::media::MediaKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tiny_http::{Header, Method, Request, Response, Server};

const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    fn failure(error: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(error.into()) }
    }
}

#[derive(Deserialize, Debug)]
struct UploadParams {
    filename: String,
}

#[derive(Deserialize, Debug)]
struct HistoryParams {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 { DEFAULT_HISTORY_LIMIT }

#[derive(Serialize)]
struct Welcome {
    name: &'static str,
    version: &'static str,
    message: &'static str,
}

/// One history row as returned by the API.
#[derive(Serialize, Debug)]
pub struct HistoryEntry {
    pub id: i32,
    pub filename: String,
    pub media_type: String,
    pub verdict: String,
    pub confidence: f64,
    pub layer_scores: BTreeMap<String, f64>,
    pub explanation: String,
    pub analyzed_at: String,
}

impl From<DbRecord> for HistoryEntry {
    fn from(rec: DbRecord) -> Self {
        let layer_scores = rec.layer_scores();
        Self {
            id: rec.id,
            filename: rec.filename,
            media_type: rec.media_type,
            verdict: rec.verdict,
            confidence: rec.confidence,
            layer_scores,
            explanation: rec.explanation,
            analyzed_at: rec.analyzed_at,
        }
    }
}

/// What a handler produced, before it is turned into a `tiny_http` response.
#[derive(Debug)]
pub enum Reply {
    Json { status: u16, body: String },
    File(PathBuf),
}

impl Reply {
    fn json<T: Serialize>(status: u16, payload: &ApiResponse<T>) -> Self {
        let body = serde_json::to_string(payload)
            .unwrap_or_else(|e| format!(r#"{{"ok":false,"data":null,"error":"{}"}}"#, e));
        Reply::Json { status, body }
    }

    fn ok<T: Serialize>(data: T) -> Self {
        Self::json(200, &ApiResponse::success(data))
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, &ApiResponse::failure(message))
    }

    pub fn status(&self) -> u16 {
        match self {
            Reply::Json { status, .. } => *status,
            Reply::File(_) => 200,
        }
    }
}

/// Everything the handlers share.
pub struct ServerState {
    orchestrator: Orchestrator,
    db: Option<Database>,
    upload_dir: PathBuf,
    max_upload_bytes: u64,
}

impl ServerState {
    /// Build state from settings. A database that cannot be opened disables
    /// history instead of refusing to start.
    pub fn from_settings(settings: &Settings) -> std::io::Result<Self> {
        std::fs::create_dir_all(&settings.upload_dir)?;
        let db = match Database::open_at(&settings.db_path) {
            Ok(db) => Some(db),
            Err(e) => {
                log::error!("database {} unavailable: {}", settings.db_path.display(), e);
                None
            }
        };
        let orchestrator = Orchestrator::from_settings(settings).with_ela_dir(&settings.upload_dir);
        Ok(Self::new(orchestrator, db, settings.upload_dir.clone(), settings.max_upload_bytes()))
    }

    pub fn new(orchestrator: Orchestrator, db: Option<Database>, upload_dir: PathBuf, max_upload_bytes: u64) -> Self {
        Self { orchestrator, db, upload_dir, max_upload_bytes }
    }

    /// Dispatch one request.
    pub fn route(&self, method: &Method, url: &str, body: &mut dyn Read) -> Reply {
        let mut parts = url.splitn(2, '?');
        let path = parts.next().unwrap_or("/");
        let query = parts.next().unwrap_or("");

        match (method, path) {
            (&Method::Get, "/") => Reply::ok(Welcome {
                name: "fakescope",
                version: env!("CARGO_PKG_VERSION"),
                message: "Layered deepfake forensics. POST media to /api/analyze?filename=<name>",
            }),
            (&Method::Post, "/api/analyze") => self.analyze_upload(query, body),
            (&Method::Get, "/api/history") => self.history(query),
            (&Method::Get, p) if p.starts_with("/uploads/") => self.static_upload(&p["/uploads/".len()..]),
            _ => Reply::error(404, "not found"),
        }
    }

    fn analyze_upload(&self, query: &str, body: &mut dyn Read) -> Reply {
        let params: UploadParams = match serde_urlencoded::from_str(query) {
            Ok(p) => p,
            Err(_) => return Reply::error(400, "missing filename parameter"),
        };

        let ext = Path::new(&params.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if MediaKind::from_extension(&ext).is_none() {
            return Reply::error(400, format!("unsupported file type: .{}", ext));
        }

        let mut data = Vec::new();
        if let Err(e) = body.take(self.max_upload_bytes.saturating_add(1)).read_to_end(&mut data) {
            return Reply::error(400, format!("could not read upload: {}", e));
        }
        if data.len() as u64 > self.max_upload_bytes {
            return Reply::error(413, format!("upload exceeds {} bytes", self.max_upload_bytes));
        }

        let stored = self.upload_dir.join(format!("{}.{}", uuid::Uuid::new_v4(), ext));
        if let Err(e) = std::fs::write(&stored, &data) {
            log::error!("cannot store upload {}: {}", stored.display(), e);
            return Reply::error(500, "could not store upload");
        }
        log::info!("→ {} ({} bytes) as {}", params.filename, data.len(), stored.display());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.orchestrator.analyze(&stored)));
        let mut report = match outcome {
            Ok(r) => r,
            Err(_) => {
                log::error!("analysis of {} aborted", stored.display());
                let _ = std::fs::remove_file(&stored);
                return Reply::error(500, "internal error during analysis");
            }
        };

        report.file_name = display_name(&params.filename);
        report.auxiliary_image_ref = report.auxiliary_image_ref.as_deref().and_then(public_ref);

        if let Some(ref db) = self.db {
            if let Err(e) = db.insert_report(&report) {
                log::warn!("could not log analysis of {}: {}", report.file_name, e);
            }
        }

        Reply::ok::<&AggregateReport>(&report)
    }

    fn history(&self, query: &str) -> Reply {
        let params: HistoryParams = match serde_urlencoded::from_str(query) {
            Ok(p) => p,
            Err(e) => return Reply::error(400, format!("invalid query: {}", e)),
        };
        let db = match self.db {
            Some(ref db) => db,
            None => return Reply::error(500, "history unavailable"),
        };
        match db.get_history(params.skip, params.limit) {
            Ok(records) => Reply::ok(records.into_iter().map(HistoryEntry::from).collect::<Vec<_>>()),
            Err(e) => {
                log::error!("history query failed: {}", e);
                Reply::error(500, "history unavailable")
            }
        }
    }

    fn static_upload(&self, name: &str) -> Reply {
        if !is_plain_file_name(name) {
            return Reply::error(404, "not found");
        }
        let path = self.upload_dir.join(name);
        if path.is_file() {
            Reply::File(path)
        } else {
            Reply::error(404, "not found")
        }
    }
}

/// Single path component with no traversal.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Client-supplied names are reported without any directory part.
fn display_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string())
}

/// Rewrite an on-disk artifact path into the URL it is served from.
fn public_ref(local: &str) -> Option<String> {
    Path::new(local)
        .file_name()
        .map(|n| format!("/uploads/{}", n.to_string_lossy()))
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn respond(request: Request, reply: Reply) -> std::io::Result<()> {
    match reply {
        Reply::Json { status, body } => {
            let mut response = Response::from_string(body).with_status_code(status);
            if let Some(h) = header("Content-Type", "application/json") {
                response = response.with_header(h);
            }
            request.respond(response)
        }
        Reply::File(path) => {
            let file = std::fs::File::open(&path)?;
            let mut response = Response::from_file(file);
            if let Some(h) = header("Content-Type", content_type(&path)) {
                response = response.with_header(h);
            }
            request.respond(response)
        }
    }
}

fn handle_request(state: &ServerState, mut request: Request) -> std::io::Result<()> {
    let method = request.method().clone();
    let url = request.url().to_string();
    let reply = state.route(&method, &url, request.as_reader());
    log::info!("{} {} → {}", method, url.split('?').next().unwrap_or("/"), reply.status());
    respond(request, reply)
}

/// Start server and handle requests until the process is stopped
pub fn start(settings: &Settings, open_browser: bool) -> std::io::Result<()> {
    let state = ServerState::from_settings(settings)?;

    let addr = format!("{}:{}", settings.host, settings.port);
    let server = Server::http(&addr).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let url = format!("http://{}", addr);
    eprintln!("\n\x1b[1;32m🔍 Fakescope\x1b[0m");
    eprintln!("   {}", url);
    eprintln!("   Uploads: {}\n", settings.upload_dir.display());

    if open_browser {
        let _ = open::that(&url);
    }

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(&state, request) {
            log::error!("request failed: {}", e);
        }
    }

    Ok(())
}
