//! Text summary builder for CLI output.
//!
//! Formats the harvest outcome, the contact table and roster totals as
//! human-readable lines for text mode.

use crate::metrics::compute_roster_metrics;
use crate::model::{format_iso_date, Contact, HarvestResult};
use crate::orchestrator::Roster;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build the success summary for a harvest plus the roster it was merged into.
pub(crate) fn build_text_summary(result: &HarvestResult, roster: &Roster) -> TextSummary {
    let mut lines = vec![
        format!("Scan completed successfully for \"{}\"", result.list_name),
        format!(
            "{} new contacts added, {} updated.",
            result.contacts_added, result.contacts_updated
        ),
        format!(
            "Total: {} contacts, {} emails logged.",
            result.total_contacts, result.total_emails_logged
        ),
        format!("Scanned: {}", result.scan_date_range),
    ];
    if let Some(list) = roster.find_by_name(&result.list_name) {
        lines.push(format!("Company list: [{}] {}", list.id, list.list_name));
    }
    if !result.notion_database_url.is_empty() {
        lines.push(format!("Notion database: {}", result.notion_database_url));
    }

    lines.push(String::new());
    lines.push(format!("{} contacts found", result.total_contacts));
    lines.extend(contact_table(&result.contacts));

    lines.push(String::new());
    lines.extend(roster_lines(roster));

    TextSummary { lines }
}

/// Detail panel for a single contact.
pub(crate) fn contact_detail(contact: &Contact) -> Vec<String> {
    vec![
        format!("{} <{}>", contact.name, contact.email),
        format!("Company: {}", contact.company),
        format!("Emails: {}", contact.email_count),
        format!("Last interaction: {}", contact.last_interaction),
        format!("Email log: {}", contact.notion_page_url),
    ]
}

fn contact_table(contacts: &[Contact]) -> Vec<String> {
    if contacts.is_empty() {
        return Vec::new();
    }
    let name_w = width(contacts.iter().map(|c| c.name.as_str()), "Name");
    let email_w = width(contacts.iter().map(|c| c.email.as_str()), "Email");
    let company_w = width(contacts.iter().map(|c| c.company.as_str()), "Company");

    let mut out = vec![format!(
        "{:<name_w$}  {:<email_w$}  {:<company_w$}  {:>6}  Last interaction",
        "Name", "Email", "Company", "Emails"
    )];
    for c in contacts {
        out.push(format!(
            "{:<name_w$}  {:<email_w$}  {:<company_w$}  {:>6}  {}",
            c.name, c.email, c.company, c.email_count, c.last_interaction
        ));
    }
    out
}

fn roster_lines(roster: &Roster) -> Vec<String> {
    if roster.is_empty() {
        return vec!["No company lists yet".to_string()];
    }
    let m = compute_roster_metrics(roster.lists());
    let last_scan = m
        .last_scan
        .map(format_iso_date)
        .unwrap_or_else(|| "N/A".to_string());
    let mut out = vec![format!(
        "Lists: {} active | Contacts: {} | Emails logged: {} | Last scan: {}",
        m.active_lists, m.total_contacts, m.total_emails_logged, last_scan
    )];
    for l in roster.lists() {
        let domains = if l.domains.is_empty() {
            "-".to_string()
        } else {
            l.domains.join(", ")
        };
        out.push(format!(
            "  [{}] {} ({}) contacts {} emails {} last scan {} [{}]",
            l.id,
            l.list_name,
            domains,
            l.contacts,
            l.emails_logged,
            format_iso_date(l.last_scan),
            l.status.as_str()
        ));
    }
    out
}

fn width<'a>(values: impl Iterator<Item = &'a str>, header: &str) -> usize {
    values
        .map(|v| v.chars().count())
        .chain(std::iter::once(header.chars().count()))
        .max()
        .unwrap_or(0)
}
