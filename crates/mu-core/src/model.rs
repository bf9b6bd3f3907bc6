//! Data model shared by every client crate
//!
//! Wire shapes follow the backend's JSON contract. The backend historically
//! used Spanish field names (`nombre_audio`, `duracion`, `estado`, ...), so the
//! history and status types accept both spellings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Server-assigned job identifier.
///
/// The backend issues integers, but the client treats ids as opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => JobId(n.to_string()),
            Raw::Text(s) => JobId(s),
        })
    }
}

/// Row key on the job board: local until the upload call returns an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobKey {
    Local(Uuid),
    Remote(JobId),
}

// ═══════════════════════════════════════════════════════════════════════════════
// JOB STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Normalized job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploading,
    Processing,
    Processed,
    Error,
}

impl JobStatus {
    /// Collapse whatever the backend reports into the fixed set.
    ///
    /// Case-insensitive. Anything containing "procesado" or equal to
    /// "processed" is done, anything containing "error" failed, the rest is
    /// still processing.
    pub fn normalize(raw: &str) -> Self {
        let s = raw.trim().to_lowercase();
        if s.contains("procesado") || s == "processed" {
            JobStatus::Processed
        } else if s.contains("error") {
            JobStatus::Error
        } else {
            JobStatus::Processing
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Processed | JobStatus::Error)
    }

    /// Occupies the single processing slot
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Uploading | JobStatus::Processing)
    }

    /// Next status, refusing to leave a terminal state.
    pub fn advance(self, next: JobStatus) -> JobStatus {
        if self.is_terminal() { self } else { next }
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Uploading => "Uploading…",
            JobStatus::Processing => "Processing…",
            JobStatus::Processed => "Ready",
            JobStatus::Error => "Error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIRE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Body of `GET /audios/{id}/status`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusReport {
    #[serde(default, alias = "estado")]
    pub status: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "duracion", deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    #[serde(default, alias = "tamano_mb", deserialize_with = "lenient_f64")]
    pub size_mb: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stem_count: Option<u32>,
}

impl StatusReport {
    pub fn normalized(&self) -> JobStatus {
        JobStatus::normalize(&self.status)
    }
}

/// One row of `GET /audios/mine`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    #[serde(alias = "audio_id_postgres")]
    pub audio_id: JobId,
    #[serde(default, alias = "nombre_audio")]
    pub title: String,
    #[serde(default, alias = "duracion", deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    #[serde(default, alias = "tamano_mb", deserialize_with = "lenient_f64")]
    pub size_mb: Option<f64>,
    #[serde(default, alias = "estado")]
    pub status: String,
    #[serde(default, alias = "fecha_procesado", deserialize_with = "lenient_timestamp")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stem_count: Option<u32>,
}

/// History is served either paginated or as a bare list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HistoryPage {
    Paged { results: Vec<HistoryEntry> },
    List(Vec<HistoryEntry>),
}

impl HistoryPage {
    pub fn into_entries(self) -> Vec<HistoryEntry> {
        match self {
            HistoryPage::Paged { results } => results,
            HistoryPage::List(entries) => entries,
        }
    }
}

/// Login payload
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Cached profile snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    #[serde(default, alias = "avatar_url")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub theme_preference: Option<String>,
}

impl User {
    pub fn theme(&self) -> Option<Theme> {
        self.theme_preference.as_deref().and_then(|t| t.parse().ok())
    }

    /// Name to greet the user with
    pub fn display(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ if !self.username.is_empty() => &self.username,
            _ => "User",
        }
    }
}

/// Theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    System,
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::System => "system",
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(Theme::System),
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{other}'")),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Separated stem, or the whole archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stem {
    Vocals,
    Drums,
    Guitar,
    Bass,
    Other,
    All,
}

impl Stem {
    /// Individual stems, in display order
    pub const SEPARATED: [Stem; 5] = [Stem::Vocals, Stem::Drums, Stem::Guitar, Stem::Bass, Stem::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Drums => "drums",
            Stem::Guitar => "guitar",
            Stem::Bass => "bass",
            Stem::Other => "other",
            Stem::All => "all",
        }
    }

    pub fn is_archive(self) -> bool {
        self == Stem::All
    }
}

impl FromStr for Stem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vocals" => Ok(Stem::Vocals),
            "drums" => Ok(Stem::Drums),
            "guitar" => Ok(Stem::Guitar),
            "bass" => Ok(Stem::Bass),
            "other" => Ok(Stem::Other),
            "all" => Ok(Stem::All),
            other => Err(format!(
                "unknown stem '{other}' (expected vocals, drums, guitar, bass, other or all)"
            )),
        }
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the upload endpoint needs
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
    pub duration_seconds: Option<f64>,
    pub size_mb: f64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// JOB
// ═══════════════════════════════════════════════════════════════════════════════

/// One uploaded track, tracked from upload through completion
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub key: JobKey,
    pub title: String,
    pub duration_seconds: Option<f64>,
    pub size_mb: f64,
    pub status: JobStatus,
    pub stem_count: Option<u32>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Optimistic row for a file that is about to be uploaded
    pub fn local(file_name: &str, size_mb: f64) -> Self {
        Self {
            key: JobKey::Local(Uuid::new_v4()),
            title: strip_extension(file_name).to_string(),
            duration_seconds: None,
            size_mb,
            status: JobStatus::Uploading,
            stem_count: None,
            processed_at: None,
        }
    }

    pub fn from_history(entry: &HistoryEntry) -> Self {
        Self {
            key: JobKey::Remote(entry.audio_id.clone()),
            title: strip_extension(&entry.title).to_string(),
            duration_seconds: entry.duration,
            size_mb: entry.size_mb.unwrap_or(0.0),
            status: JobStatus::normalize(&entry.status),
            stem_count: entry.stem_count,
            processed_at: entry.processed_at,
        }
    }

    pub fn id(&self) -> Option<&JobId> {
        match &self.key {
            JobKey::Remote(id) => Some(id),
            JobKey::Local(_) => None,
        }
    }

    /// Fold a status report into the row. Terminal states stick.
    pub fn apply_report(&mut self, report: &StatusReport) -> JobStatus {
        self.status = self.status.advance(report.normalized());
        if let Some(title) = report.title.as_deref().filter(|t| !t.is_empty()) {
            self.title = strip_extension(title).to_string();
        }
        if report.duration.is_some() {
            self.duration_seconds = report.duration;
        }
        if let Some(size) = report.size_mb {
            self.size_mb = size;
        }
        if report.processed_at.is_some() {
            self.processed_at = report.processed_at;
        }
        if report.stem_count.is_some() {
            self.stem_count = report.stem_count;
        }
        self.status
    }
}

/// `song.final.mp3` -> `song.final`
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 && !name[idx + 1..].contains(['/', '\\']) => &name[..idx],
        _ => name,
    }
}

/// Bytes to megabytes, two decimals
pub fn bytes_to_mb(bytes: u64) -> f64 {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    (mb * 100.0).round() / 100.0
}

/// Seconds as M:SS, or a dash when unknown
pub fn format_duration(seconds: Option<f64>) -> String {
    match seconds.filter(|s| s.is_finite()) {
        Some(s) => {
            let total = s.max(0.0).round() as u64;
            format!("{}:{:02}", total / 60, total % 60)
        }
        None => "—".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LENIENT DESERIALIZERS
// ═══════════════════════════════════════════════════════════════════════════════

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) if n.is_finite() => Some(n),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    })
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// RFC 3339, or a naive timestamp taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
