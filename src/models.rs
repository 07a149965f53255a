use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Intern,
    Tutor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Intern => "INTERN",
            Role::Tutor => "TUTOR",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INTERN" => Ok(Role::Intern),
            "TUTOR" => Ok(Role::Tutor),
            "ADMIN" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Approved => "APPROVED",
            VerificationStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(VerificationStatus::Pending),
            "APPROVED" => Ok(VerificationStatus::Approved),
            "REJECTED" => Ok(VerificationStatus::Rejected),
            other => anyhow::bail!("unknown verification status {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

/// The identity a request is evaluated on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub id: Uuid,
    pub role: Role,
}

impl From<&User> for Requester {
    fn from(user: &User) -> Self {
        Requester {
            id: user.id,
            role: user.role,
        }
    }
}

/// A requirement joined with its rotation and procedure.
#[derive(Debug, Clone, Serialize)]
pub struct Requirement {
    pub rotation_id: Uuid,
    pub rotation_name: String,
    pub procedure_id: Uuid,
    pub procedure_name: String,
    pub min_count: i32,
    pub training_level: Option<String>,
}

/// A log entry joined with its verification, procedure, rotation and intern.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub id: Uuid,
    pub intern_id: Uuid,
    pub intern_name: String,
    pub procedure_id: Uuid,
    pub procedure_name: String,
    pub rotation_id: Uuid,
    pub rotation_name: String,
    pub performed_at: DateTime<Utc>,
    pub count: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: VerificationStatus,
    pub verifier_name: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationProgress {
    pub rotation_id: Uuid,
    pub rotation_name: String,
    pub required: i64,
    pub verified: i64,
    pub pending: i64,
    pub over_achieved: i64,
    pub completion_percentage: i64,
    pub over_achievement_percentage: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub required: i64,
    pub verified: i64,
    pub pending: i64,
    pub over_achieved: i64,
    pub completion_percentage: i64,
    pub over_achievement_percentage: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVerification {
    pub log_entry_id: Uuid,
    pub procedure_name: String,
    pub rotation_name: String,
    pub date: NaiveDate,
    pub count: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub log_entry_id: Uuid,
    pub procedure_name: String,
    pub date: NaiveDate,
    pub count: i32,
    pub status: VerificationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternDashboard {
    pub intern_id: Uuid,
    pub intern_name: String,
    pub summary: ProgressSummary,
    pub rotations: Vec<RotationProgress>,
    pub pending_verifications: Vec<PendingVerification>,
    pub recent_activity: Vec<ActivityItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternOverview {
    pub intern_id: Uuid,
    pub intern_name: String,
    pub verified: i64,
    pub pending: i64,
    pub over_achieved: i64,
    pub completion_percentage: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub total_interns: usize,
    pub pending_verifications: usize,
    pub recent_activity_count: usize,
    pub interns: Vec<InternOverview>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OverviewOrder {
    #[default]
    Id,
    Name,
}

#[derive(Debug, Clone)]
pub struct ExportParams {
    pub user_id: Uuid,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogExportRow {
    #[serde(rename = "Procedure")]
    pub procedure_name: String,
    #[serde(rename = "Rotation")]
    pub rotation_name: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Count")]
    pub count: i32,
    #[serde(rename = "Status")]
    pub status: VerificationStatus,
    #[serde(rename = "Verifier")]
    pub verifier_name: Option<String>,
    #[serde(rename = "Verified At")]
    pub verified_at: Option<String>,
    #[serde(rename = "Reason")]
    pub reason: Option<String>,
}
