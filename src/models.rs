use chrono::{DateTime, NaiveDate, Utc};
use inflections::case::to_title_case;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Denied => "DENIED",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(RequestStatus::Pending),
            "APPROVED" => Ok(RequestStatus::Approved),
            "DENIED" => Ok(RequestStatus::Denied),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

/// How a request's status was last written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusUpdateMethod {
    /// A reviewer decision applied through a recorded reply.
    EmailReply,
    Manual,
}

impl StatusUpdateMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusUpdateMethod::EmailReply => "EMAIL_REPLY",
            StatusUpdateMethod::Manual => "MANUAL",
        }
    }
}

impl std::str::FromStr for StatusUpdateMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMAIL_REPLY" => Ok(StatusUpdateMethod::EmailReply),
            "MANUAL" => Ok(StatusUpdateMethod::Manual),
            _ => Err(format!("Invalid status update method: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmailMode {
    Automatic,
    Manual,
}

impl EmailMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailMode::Automatic => "automatic",
            EmailMode::Manual => "manual",
        }
    }
}

impl std::str::FromStr for EmailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "automatic" => Ok(EmailMode::Automatic),
            "manual" => Ok(EmailMode::Manual),
            _ => Err(format!("Invalid email mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    DayOff,
    AnnualLeave,
    SickLeave,
    Training,
    Other,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::DayOff => "DAY_OFF",
            RequestType::AnnualLeave => "ANNUAL_LEAVE",
            RequestType::SickLeave => "SICK_LEAVE",
            RequestType::Training => "TRAINING",
            RequestType::Other => "OTHER",
        }
    }

    /// "ANNUAL_LEAVE" -> "Annual Leave"
    pub fn display_name(&self) -> String {
        to_title_case(&self.as_str().to_lowercase())
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DAY_OFF" => Ok(RequestType::DayOff),
            "ANNUAL_LEAVE" => Ok(RequestType::AnnualLeave),
            "SICK_LEAVE" => Ok(RequestType::SickLeave),
            "TRAINING" => Ok(RequestType::Training),
            "OTHER" => Ok(RequestType::Other),
            _ => Err(format!("Invalid request type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterPeriod {
    pub id: i64,
    pub name: Option<String>,
    pub start_period: NaiveDate,
    pub end_period: NaiveDate,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeOffRequest {
    pub id: i64,
    pub user_id: String,
    pub group_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub request_type: RequestType,
    pub flight_number: Option<String>,
    pub notes: Option<String>,
    pub status: RequestStatus,
    pub status_update_method: Option<StatusUpdateMethod>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub approval_date: Option<DateTime<Utc>>,
    pub email_mode: EmailMode,
    pub email_sent: Option<DateTime<Utc>>,
    pub manual_email_confirmed: bool,
    pub gmail_thread_id: Option<String>,
    pub needs_review: bool,
    pub reply_count: i64,
    pub last_reply_at: Option<DateTime<Utc>>,
    pub last_reply_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when a user submits a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTimeOffRequest {
    pub user_id: String,
    pub group_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub request_type: RequestType,
    pub flight_number: Option<String>,
    pub notes: Option<String>,
    pub email_mode: EmailMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: i64,
    pub time_off_request_id: i64,
    pub gmail_message_id: String,
    pub gmail_thread_id: String,
    pub from_email: String,
    pub from_name: Option<String>,
    pub body: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub user_reply_sent: bool,
    pub user_reply_content: Option<String>,
    pub user_reply_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Reply {
    /// First line of the body, trimmed to a short preview.
    pub fn snippet(&self) -> String {
        let body = self.body.as_deref().unwrap_or_default();
        let line = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
        line.chars().take(120).collect()
    }
}

/// One message of a thread as reported by the messaging service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadMessage {
    pub id: String,
    pub from_email: String,
    pub from_name: Option<String>,
    pub body: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_user_reply: bool,
}
