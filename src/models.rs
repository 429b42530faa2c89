use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    /// Parse a stored status string. Unknown values return `None` and are
    /// treated as malformed by the aggregator.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            _ => None,
        }
    }
}

/// One raw attendance record for the student under summary. Rows are always
/// fetched pre-scoped to a single student, so the owning id is not re-carried
/// here.
#[derive(Debug, Clone)]
pub struct AttendanceEvent {
    pub occurred_on: NaiveDate,
    pub subject_code: Option<String>,
    pub subject_name: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct SubjectRef {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub total_classes: i32,
    pub attended_classes: i32,
    pub subjects: Vec<SubjectRef>,
}

/// Whether a summary was computed from raw events or estimated from the
/// student's lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Measured,
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthPercent {
    pub month: String,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectPercent {
    pub name: String,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapDay {
    pub date: NaiveDate,
    pub value: f64,
}

/// The public summary contract; field names are what dashboard consumers
/// depend on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub overall_percentage: u32,
    pub total_classes: u32,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub monthly: Vec<MonthPercent>,
    pub subjects: Vec<SubjectPercent>,
    pub heatmap: Vec<HeatmapDay>,
    pub source: SummarySource,
    pub skipped_records: u32,
}
