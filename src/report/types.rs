use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Column names of the CSV report, in order.
pub const HEADER: [&str; 5] = [
    "Repository",
    "Author",
    "Date_Created",
    "Title",
    "Code_Owners",
];

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestRecord {
    #[serde(rename = "Repository")]
    pub repository: String,
    #[serde(rename = "Author")]
    pub author: String,
    #[serde(rename = "Date_Created", serialize_with = "serialize_timestamp")]
    pub date_created: DateTime<Utc>,
    #[serde(rename = "Title")]
    pub title: String,
    /// Normalized code owners text; empty when unknown
    #[serde(rename = "Code_Owners")]
    pub code_owners: String,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format("%Y-%m-%d %H:%M:%S"))
}
