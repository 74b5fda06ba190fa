use crate::model::{iso_date, CompanyList, ListStatus};
use serde::Serialize;
use time::Date;

/// Dashboard totals across every list in the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RosterMetrics {
    pub total_contacts: u64,
    pub total_emails_logged: u64,
    pub active_lists: usize,
    #[serde(serialize_with = "serialize_last_scan")]
    pub last_scan: Option<Date>,
}

fn serialize_last_scan<S: serde::Serializer>(d: &Option<Date>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => iso_date::serialize(d, s),
        None => s.serialize_none(),
    }
}

/// Compute roster totals (contacts, emails logged, active lists, most recent scan).
pub fn compute_roster_metrics(lists: &[CompanyList]) -> RosterMetrics {
    RosterMetrics {
        total_contacts: lists.iter().map(|l| l.contacts).sum(),
        total_emails_logged: lists.iter().map(|l| l.emails_logged).sum(),
        active_lists: lists
            .iter()
            .filter(|l| l.status == ListStatus::Active)
            .count(),
        last_scan: lists.iter().map(|l| l.last_scan).max(),
    }
}
