use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::Date;

const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Format a calendar date as `YYYY-MM-DD`.
pub fn format_iso_date(date: Date) -> String {
    date.format(ISO_DATE).unwrap_or_else(|_| date.to_string())
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_iso_date(input: &str) -> Result<Date, time::error::Parse> {
    Date::parse(input.trim(), ISO_DATE)
}

/// Serde adapter for `YYYY-MM-DD` dates.
pub mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_iso_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_iso_date(&text).map_err(serde::de::Error::custom)
    }
}

/// One tracked person, as reported by a harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub company: String,
    pub email_count: u64,
    pub last_interaction: String,
    pub notion_page_url: String,
}

/// Closed calendar interval with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDateRange {
    #[serde(with = "iso_date")]
    pub start: Date,
    #[serde(with = "iso_date")]
    pub end: Date,
}

impl ScanDateRange {
    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

impl fmt::Display for ScanDateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            format_iso_date(self.start),
            format_iso_date(self.end)
        )
    }
}

/// Normalized output of one successful harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestResult {
    pub list_name: String,
    pub notion_database_url: String,
    pub contacts_added: u64,
    pub contacts_updated: u64,
    pub total_contacts: u64,
    pub total_emails_logged: u64,
    pub scan_date_range: ScanDateRange,
    pub contacts: Vec<Contact>,
}

impl HarvestResult {
    /// Check the cross-field invariants serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.total_contacts != self.contacts.len() as u64 {
            return Err(format!(
                "total_contacts is {} but {} contacts were returned",
                self.total_contacts,
                self.contacts.len()
            ));
        }
        let touched = self.contacts_added.checked_add(self.contacts_updated);
        if touched.map_or(true, |n| n > self.total_contacts) {
            return Err(format!(
                "contacts_added ({}) + contacts_updated ({}) exceeds total_contacts ({})",
                self.contacts_added, self.contacts_updated, self.total_contacts
            ));
        }
        if !self.scan_date_range.is_ordered() {
            return Err(format!(
                "scan_date_range starts after it ends ({})",
                self.scan_date_range
            ));
        }
        // Same comparison as `contact_by_email`, so every lookup has one answer.
        let mut seen = HashSet::new();
        for c in &self.contacts {
            if !seen.insert(c.email.trim().to_ascii_lowercase()) {
                return Err(format!("duplicate contact email {:?}", c.email));
            }
        }
        Ok(())
    }

    /// Look up a contact for the detail view.
    pub fn contact_by_email(&self, email: &str) -> Option<&Contact> {
        self.contacts
            .iter()
            .find(|c| c.email.trim().eq_ignore_ascii_case(email.trim()))
    }
}

/// Roster identifier; allocated once and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyListId(pub u64);

impl fmt::Display for CompanyListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStatus {
    Active,
    Scanning,
    Error,
}

impl ListStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ListStatus::Active => "active",
            ListStatus::Scanning => "scanning",
            ListStatus::Error => "error",
        }
    }
}

/// Summary record for one tracked company list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyList {
    pub id: CompanyListId,
    pub list_name: String,
    pub domains: Vec<String>,
    pub contacts: u64,
    pub emails_logged: u64,
    #[serde(with = "iso_date")]
    pub last_scan: Date,
    pub status: ListStatus,
    #[serde(default)]
    pub notion_url: Option<String>,
}

/// Date bounds as the agent expects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangePayload {
    pub start_date: String,
    pub end_date: String,
}

impl From<ScanDateRange> for DateRangePayload {
    fn from(range: ScanDateRange) -> Self {
        Self {
            start_date: format_iso_date(range.start),
            end_date: format_iso_date(range.end),
        }
    }
}

/// Request sent to the harvest agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestRequest {
    pub list_name: String,
    pub target_domains: Vec<String>,
    pub date_range: DateRangePayload,
}

impl HarvestRequest {
    pub fn new(list_name: &str, domains: &[String], range: ScanDateRange) -> Self {
        Self {
            list_name: list_name.to_string(),
            target_domains: domains.to_vec(),
            date_range: range.into(),
        }
    }
}

/// Response envelope returned by the agent. Every field stays raw until the status is known;
/// a status or message of the wrong JSON type is still a rejection, not a malformed reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentEnvelope {
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// What the user asked to harvest, after the date range has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestInput {
    pub list_name: String,
    pub domains: Vec<String>,
    pub range: ScanDateRange,
}

/// User-visible phase of the request lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Submitting { list_name: String },
    // Box to keep the enum small; HarvestResult carries the full contact list.
    Succeeded(Box<HarvestResult>),
    Failed { message: String },
}

/// Events emitted by the controller and consumed by presentation layers.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    StateChanged(LifecycleState),
    SubmitRejected { reason: String },
    RosterChanged { lists: Vec<CompanyList> },
    /// The input surface should close (auto-dismiss after success).
    InputClosed,
    Info(InfoEvent),
}

/// Structured info events for UI/CLI layers.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    Submitting {
        list_name: String,
        domains: usize,
        range: ScanDateRange,
    },
    StaleResultDiscarded { list_name: String },
    ListDeleted { id: CompanyListId },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Submitting {
                list_name,
                domains,
                range,
            } => format!(
                "Creating & scanning \"{}\" ({} domain{}, {})",
                list_name,
                domains,
                if *domains == 1 { "" } else { "s" },
                range
            ),
            InfoEvent::StaleResultDiscarded { list_name } => {
                format!("Discarded late result for \"{}\"", list_name)
            }
            InfoEvent::ListDeleted { id } => format!("Deleted list {}", id),
        }
    }
}
