use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const DEFAULT_INSTITUTE: &str = "Default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Student,
    Faculty,
    Staff,
    Admin,
    Anonymous,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Faculty => "Faculty",
            Role::Staff => "Staff",
            Role::Admin => "Admin",
            Role::Anonymous => "Anonymous",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            "anonymous" | "" => Ok(Role::Anonymous),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub id: Uuid,
    pub institute_id: String,
    pub role: Role,
    pub user_name: String,
    pub category: String,
    pub text: String,
    pub submitted_at: DateTime<Utc>,
}

/// Submission payload as it arrives from the portal or a CSV import.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFeedback {
    #[serde(default)]
    pub institute_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Negative => "Negative",
            Sentiment::Neutral => "Neutral",
        }
    }
}

impl From<Option<String>> for Sentiment {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "positive" => Sentiment::Positive,
            Some(v) if v == "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked remediation for a cluster. Always serialized in the v2 shape
/// (`solution_title`, `total_estimated_cost`); v1 field names and bare
/// strings are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SolutionRepr")]
pub struct Solution {
    pub solution_title: String,
    pub steps: Vec<String>,
    pub sentiment: Sentiment,
    pub total_estimated_cost: Option<String>,
    pub required_tools: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SolutionRepr {
    Title(String),
    Record(SolutionRecord),
}

#[derive(Deserialize)]
struct SolutionRecord {
    #[serde(alias = "solution")]
    solution_title: String,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    sentiment: Sentiment,
    #[serde(default, alias = "estimated_cost", deserialize_with = "lenient_cost")]
    total_estimated_cost: Option<String>,
    #[serde(default)]
    required_tools: Option<String>,
}

impl From<SolutionRepr> for Solution {
    fn from(repr: SolutionRepr) -> Self {
        match repr {
            SolutionRepr::Title(title) => Solution {
                solution_title: title,
                steps: Vec::new(),
                sentiment: Sentiment::Neutral,
                total_estimated_cost: None,
                required_tools: None,
            },
            SolutionRepr::Record(record) => Solution {
                solution_title: record.solution_title,
                steps: record.steps,
                sentiment: record.sentiment,
                total_estimated_cost: record.total_estimated_cost,
                required_tools: record.required_tools,
            },
        }
    }
}

fn lenient_cost<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Cost {
        Text(String),
        Amount(f64),
    }

    Ok(match Option::<Cost>::deserialize(deserializer)? {
        Some(Cost::Text(text)) => Some(text),
        Some(Cost::Amount(amount)) => Some(format!("{amount:.2}")),
        None => None,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub institute_id: String,
    pub theme: String,
    pub problem_statement: String,
    pub count: usize,
    pub solutions: Vec<Solution>,
    #[serde(default)]
    pub feedback_ids: Vec<Uuid>,
    #[serde(default)]
    pub sample_texts: Vec<String>,
}

impl Cluster {
    pub fn primary_sentiment(&self) -> Sentiment {
        self.solutions
            .first()
            .map(|solution| solution.sentiment)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSet {
    #[serde(default)]
    pub institute_id: String,
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

impl ClusterSet {
    pub fn empty(institute_id: &str) -> Self {
        Self {
            institute_id: institute_id.to_string(),
            computed_at: None,
            clusters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total: usize,
    pub roles: BTreeMap<String, usize>,
    pub categories: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Institute {
    pub id: String,
    pub name: String,
    pub email: String,
    pub address: String,
    pub admin_id: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewInstitute {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub admin_id: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Markdown,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unsupported export format '{other}'")),
        }
    }
}
