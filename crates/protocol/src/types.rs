use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted status of one chunk of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub index: u32,
    pub uploaded: bool,
    pub failed: bool,
    pub retry_count: u32,
}

impl ChunkRecord {
    /// A chunk that was never attempted.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            uploaded: false,
            failed: false,
            retry_count: 0,
        }
    }
}

/// One tracked attempt to upload one file in chunks.
///
/// This is the unit of persistence: the full snapshot, including the chunk
/// table, is written on every chunk-status transition. File bytes are never
/// part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
    pub chunk_size: u64,
    pub chunks: Vec<ChunkRecord>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Session {
    /// Number of chunks with `uploaded = true`.
    pub fn uploaded_count(&self) -> u32 {
        self.chunks.iter().filter(|c| c.uploaded).count() as u32
    }

    /// Indices of chunks currently marked failed, ascending.
    pub fn failed_chunks(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .filter(|c| c.failed)
            .map(|c| c.index)
            .collect()
    }

    /// Indices not uploaded yet, ascending. Failed chunks are included.
    pub fn pending_chunks(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .filter(|c| !c.uploaded)
            .map(|c| c.index)
            .collect()
    }

    /// Returns `true` if at least one chunk is not uploaded yet.
    pub fn has_outstanding_work(&self) -> bool {
        self.chunks.iter().any(|c| !c.uploaded)
    }

    /// Returns `true` once every chunk is uploaded.
    pub fn is_complete(&self) -> bool {
        !self.chunks.is_empty() && self.chunks.iter().all(|c| c.uploaded)
    }

    /// Upload progress as a percentage (0-100) of uploaded chunks.
    pub fn progress_percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        100.0 * self.uploaded_count() as f64 / self.total_chunks as f64
    }

    /// Bytes covered by uploaded chunks.
    ///
    /// Clamped to the file size because the last chunk may be short.
    pub fn uploaded_bytes(&self) -> u64 {
        (self.uploaded_count() as u64 * self.chunk_size).min(self.file_size)
    }

    /// Returns the record at `index`, if it exists.
    pub fn chunk(&self, index: u32) -> Option<&ChunkRecord> {
        self.chunks.get(index as usize)
    }
}

/// Simulated network speed, selecting a latency window for each chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpeedTier {
    Fast,
    Normal,
    Slow,
    #[default]
    VerySlow,
}

impl SpeedTier {
    /// All tiers, fastest first.
    pub const ALL: [SpeedTier; 4] = [
        SpeedTier::Fast,
        SpeedTier::Normal,
        SpeedTier::Slow,
        SpeedTier::VerySlow,
    ];

    /// Inclusive latency window in milliseconds.
    pub fn latency_ms(self) -> (u64, u64) {
        match self {
            SpeedTier::Fast => (50, 150),
            SpeedTier::Normal => (150, 300),
            SpeedTier::Slow => (500, 1000),
            SpeedTier::VerySlow => (1000, 2000),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpeedTier::Fast => "fast",
            SpeedTier::Normal => "normal",
            SpeedTier::Slow => "slow",
            SpeedTier::VerySlow => "verySlow",
        }
    }
}

impl fmt::Display for SpeedTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown speed tier name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown speed tier: {0} (expected fast, normal, slow or verySlow)")]
pub struct ParseSpeedTierError(pub String);

impl FromStr for SpeedTier {
    type Err = ParseSpeedTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(SpeedTier::Fast),
            "normal" => Ok(SpeedTier::Normal),
            "slow" => Ok(SpeedTier::Slow),
            "verySlow" | "very-slow" | "very_slow" => Ok(SpeedTier::VerySlow),
            other => Err(ParseSpeedTierError(other.to_string())),
        }
    }
}

/// Externally observed state of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadStatus {
    /// No transfer loop active and nothing blocking.
    Idle,
    /// A transfer loop is dispatching chunks.
    Running,
    /// A pause was requested; the chunk table is kept for resume.
    Paused,
    /// Every chunk is uploaded.
    Completed,
    /// The main pass ended with failed chunks that need an explicit retry.
    Stalled,
    /// Pending work exists but no validated data source is bound.
    NeedsDataSource,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Idle => "idle",
            UploadStatus::Running => "running",
            UploadStatus::Paused => "paused",
            UploadStatus::Completed => "completed",
            UploadStatus::Stalled => "stalled",
            UploadStatus::NeedsDataSource => "needs data source",
        };
        f.write_str(s)
    }
}

/// Read-only progress snapshot for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub session_id: String,
    pub file_name: String,
    pub status: UploadStatus,
    pub total_chunks: u32,
    pub uploaded_chunks: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_chunks: Vec<u32>,
    pub progress_percent: f64,
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    pub speed_tier: SpeedTier,
    pub bytes_per_second: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(records: Vec<ChunkRecord>, chunk_size: u64, file_size: u64) -> Session {
        let now = Utc::now();
        Session {
            id: "s1".into(),
            file_name: "movie.mkv".into(),
            file_size,
            total_chunks: records.len() as u32,
            chunk_size,
            chunks: records,
            created_at: now,
            last_update: now,
        }
    }

    fn record(index: u32, uploaded: bool, failed: bool) -> ChunkRecord {
        ChunkRecord {
            index,
            uploaded,
            failed,
            retry_count: u32::from(failed),
        }
    }

    #[test]
    fn pending_excludes_only_uploaded() {
        let s = session_with(
            vec![
                record(0, true, false),
                record(1, false, true),
                record(2, false, false),
                record(3, false, false),
            ],
            10,
            40,
        );
        assert_eq!(s.pending_chunks(), vec![1, 2, 3]);
        assert_eq!(s.failed_chunks(), vec![1]);
        assert_eq!(s.uploaded_count(), 1);
        assert!(s.has_outstanding_work());
        assert!(!s.is_complete());
    }

    #[test]
    fn progress_percent_is_exact_ratio() {
        let s = session_with(
            vec![
                record(0, true, false),
                record(1, false, false),
                record(2, false, false),
            ],
            10,
            25,
        );
        assert!((s.progress_percent() - 100.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn uploaded_bytes_clamped_to_file_size() {
        let s = session_with(vec![record(0, true, false), record(1, true, false)], 10, 15);
        assert_eq!(s.uploaded_bytes(), 15);
        assert!(s.is_complete());
        assert!((s.progress_percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn session_field_names() {
        let s = session_with(vec![record(0, false, false)], 10, 5);
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("fileName").is_some());
        assert!(json.get("totalChunks").is_some());
        assert!(json.get("lastUpdate").is_some());
        assert!(json["chunks"][0].get("retryCount").is_some());
    }

    #[test]
    fn speed_tier_windows() {
        assert_eq!(SpeedTier::Fast.latency_ms(), (50, 150));
        assert_eq!(SpeedTier::Normal.latency_ms(), (150, 300));
        assert_eq!(SpeedTier::Slow.latency_ms(), (500, 1000));
        assert_eq!(SpeedTier::VerySlow.latency_ms(), (1000, 2000));
        assert_eq!(SpeedTier::default(), SpeedTier::VerySlow);
    }

    #[test]
    fn speed_tier_parse_and_display() {
        for tier in SpeedTier::ALL {
            assert_eq!(tier.to_string().parse::<SpeedTier>().unwrap(), tier);
        }
        assert_eq!("very-slow".parse::<SpeedTier>().unwrap(), SpeedTier::VerySlow);
        assert!("warp".parse::<SpeedTier>().is_err());
        assert_eq!(
            serde_json::to_string(&SpeedTier::VerySlow).unwrap(),
            "\"verySlow\""
        );
    }

    #[test]
    fn upload_status_serialization() {
        assert_eq!(
            serde_json::to_string(&UploadStatus::NeedsDataSource).unwrap(),
            "\"needsDataSource\""
        );
        assert_eq!(
            serde_json::to_string(&UploadStatus::Stalled).unwrap(),
            "\"stalled\""
        );
    }

    #[test]
    fn progress_omits_empty_failed_list() {
        let p = UploadProgress {
            session_id: "s1".into(),
            file_name: "a.bin".into(),
            status: UploadStatus::Running,
            total_chunks: 2,
            uploaded_chunks: 1,
            failed_chunks: vec![],
            progress_percent: 50.0,
            total_bytes: 20,
            uploaded_bytes: 10,
            speed_tier: SpeedTier::Fast,
            bytes_per_second: 0.0,
            eta_secs: None,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("failedChunks"));
        assert!(!json.contains("etaSecs"));
    }
}
