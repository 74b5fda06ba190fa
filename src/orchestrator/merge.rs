//! Roster of company lists and the harvest merge step.
//!
//! `merge` is the only writer of harvest-derived fields; `Roster::delete` is the
//! only way a list goes away.

use crate::model::{CompanyList, CompanyListId, HarvestResult, ListStatus};

/// In-memory collection of company lists, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    lists: Vec<CompanyList>,
    // Last allocated id; never decremented, so deleted ids are never handed out again.
    last_id: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lists(&self) -> &[CompanyList] {
        &self.lists
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn get(&self, id: CompanyListId) -> Option<&CompanyList> {
        self.lists.iter().find(|l| l.id == id)
    }

    /// Exact, case-sensitive name match.
    pub fn find_by_name(&self, name: &str) -> Option<&CompanyList> {
        self.lists.iter().find(|l| l.list_name == name)
    }

    /// Remove a list. Unknown ids are ignored; returns whether anything was removed.
    pub fn delete(&mut self, id: CompanyListId) -> bool {
        let before = self.lists.len();
        self.lists.retain(|l| l.id != id);
        self.lists.len() != before
    }

    fn allocate_id(&mut self) -> CompanyListId {
        self.last_id += 1;
        CompanyListId(self.last_id)
    }
}

/// Fold a successful harvest into the roster.
///
/// A new list name appends an entry; a known name has its counts overwritten with
/// the result's cumulative totals. The returned result becomes the displayed one.
pub fn merge(roster: &Roster, result: &HarvestResult) -> (Roster, HarvestResult) {
    let mut next = roster.clone();
    let last_scan = result.scan_date_range.end;

    match next
        .lists
        .iter()
        .position(|l| l.list_name == result.list_name)
    {
        Some(idx) => {
            let existing = &mut next.lists[idx];
            existing.contacts = result.total_contacts;
            existing.emails_logged = result.total_emails_logged;
            existing.last_scan = last_scan;
            existing.notion_url = Some(result.notion_database_url.clone());
            existing.status = ListStatus::Active;
        }
        None => {
            let id = next.allocate_id();
            next.lists.push(CompanyList {
                id,
                list_name: result.list_name.clone(),
                domains: Vec::new(),
                contacts: result.total_contacts,
                emails_logged: result.total_emails_logged,
                last_scan,
                status: ListStatus::Active,
                notion_url: Some(result.notion_database_url.clone()),
            });
        }
    }

    (next, result.clone())
}
