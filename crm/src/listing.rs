//! Section, filter and sort rules for the pipeline list.

use std::cmp::Ordering;

use entity::action::{ActionType, Stage};
use serde::{Deserialize, Serialize};

use crate::format::display_name;
use crate::snapshot::PipelineRow;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Board,
    /// Pipelines that had a meeting last or are flagged for follow-up.
    #[default]
    Active,
    Pipe,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Case-insensitive substring of client name or campaign.
    pub search: String,
    pub product: Option<String>,
    pub owner: Option<String>,
    pub stage: Option<Stage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    LastDate,
    Product,
    Client,
    Campaign,
    Count,
    Followup,
    Owner,
    LastActionType,
    CurrentStage,
    CurrentBudget,
    LastMemo,
    ContactName,
    ContactPhone,
    ContactEmail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortState {
    active: Option<(SortField, SortDirection)>,
}

impl SortState {
    pub fn by(field: SortField, direction: SortDirection) -> Self {
        Self {
            active: Some((field, direction)),
        }
    }

    pub fn active(&self) -> Option<(SortField, SortDirection)> {
        self.active
    }

    /// asc → desc → unsorted on the same field; a new field starts at asc.
    pub fn toggle(&mut self, field: SortField) {
        self.active = match self.active {
            Some((current, SortDirection::Asc)) if current == field => {
                Some((field, SortDirection::Desc))
            }
            Some((current, SortDirection::Desc)) if current == field => None,
            _ => Some((field, SortDirection::Asc)),
        };
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListState {
    pub section: Section,
    pub filter: ListFilter,
    pub sort: SortState,
}

pub fn in_section(row: &PipelineRow, section: Section) -> bool {
    match section {
        Section::Active => {
            row.state.last_action_type == Some(ActionType::Meeting) || row.pipeline_followup
        }
        Section::Board | Section::Pipe => true,
    }
}

pub fn matches_filter(row: &PipelineRow, filter: &ListFilter) -> bool {
    let state = &row.state;
    let search = filter.search.trim().to_lowercase();
    let matches_search = search.is_empty()
        || state.client_name.to_lowercase().contains(&search)
        || state
            .campaign
            .as_deref()
            .is_some_and(|campaign| campaign.to_lowercase().contains(&search));

    matches_search
        && filter
            .product
            .as_deref()
            .is_none_or(|product| state.product == product)
        && filter
            .owner
            .as_deref()
            .is_none_or(|owner| state.manager_name.as_deref() == Some(owner))
        && filter
            .stage
            .is_none_or(|stage| state.current_stage == Some(stage))
}

/// Rows of `section` that pass `filter`, in `sort` order. Unsorted lists keep
/// the snapshot order.
pub fn visible_rows<'a>(rows: &'a [PipelineRow], state: &ListState) -> Vec<&'a PipelineRow> {
    let mut visible: Vec<&PipelineRow> = rows
        .iter()
        .filter(|row| in_section(row, state.section) && matches_filter(row, &state.filter))
        .collect();
    sort_rows(&mut visible, state.sort);
    visible
}

enum SortKey {
    Number(i64),
    Text(String),
}

fn sort_key(row: &PipelineRow, field: SortField) -> Option<SortKey> {
    let state = &row.state;
    let text = |value: Option<&str>| value.map(|v| SortKey::Text(v.to_lowercase()));
    match field {
        SortField::LastDate => state.last_date.map(|d| SortKey::Text(d.to_string())),
        SortField::Product => text(Some(state.product.as_str())),
        SortField::Client => text(Some(state.client_name.as_str())),
        SortField::Campaign => text(state.campaign.as_deref()),
        SortField::Count => Some(SortKey::Number(state.action_count)),
        SortField::Followup => Some(SortKey::Text(row.pipeline_followup.to_string())),
        SortField::Owner => text(state.manager_name.as_deref()),
        SortField::LastActionType => text(state.last_action_type.map(ActionType::as_str)),
        SortField::CurrentStage => text(state.current_stage.map(Stage::as_str)),
        SortField::CurrentBudget => state.current_budget.map(SortKey::Number),
        SortField::LastMemo => text(state.last_memo.as_deref()),
        SortField::ContactName => text(state.contact_name.as_deref()),
        SortField::ContactPhone => text(state.contact_phone.as_deref()),
        SortField::ContactEmail => text(state.contact_email.as_deref()),
    }
}

fn compare_keys(a: &SortKey, b: &SortKey) -> Ordering {
    match (a, b) {
        (SortKey::Number(a), SortKey::Number(b)) => a.cmp(b),
        (a, b) => key_text(a).cmp(&key_text(b)),
    }
}

fn key_text(key: &SortKey) -> String {
    match key {
        SortKey::Number(n) => n.to_string(),
        SortKey::Text(text) => text.clone(),
    }
}

/// Stable sort; rows without a value go last in either direction.
pub fn sort_rows(rows: &mut [&PipelineRow], sort: SortState) {
    let Some((field, direction)) = sort.active() else {
        return;
    };
    rows.sort_by(|a, b| match (sort_key(a, field), sort_key(b, field)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = compare_keys(&a, &b);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    });
}

/// Distinct non-empty owner names, sorted, for the owner filter.
pub fn owner_filter_options(rows: &[PipelineRow]) -> Vec<String> {
    let mut owners: Vec<String> = rows
        .iter()
        .filter_map(|row| row.state.manager_name.clone())
        .filter(|name| !name.is_empty())
        .collect();
    owners.sort();
    owners.dedup();
    owners
}

/// Entry of the pipeline picker used when recording an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickerOption {
    pub unique_id: String,
    pub display_name: String,
    pub owner: String,
}

/// Pipelines whose display name or owner contains `term`
/// (case-insensitive), in snapshot order.
pub fn picker_options(rows: &[PipelineRow], term: &str) -> Vec<PickerOption> {
    let term = term.to_lowercase();
    rows.iter()
        .filter_map(|row| {
            let state = &row.state;
            let name = display_name(&state.client_name, state.campaign.as_deref());
            let owner = state.manager_name.clone().unwrap_or_default();
            let hit = name.to_lowercase().contains(&term) || owner.to_lowercase().contains(&term);
            hit.then(|| PickerOption {
                unique_id: state.unique_id.clone(),
                display_name: name,
                owner: if owner.is_empty() { "-".to_owned() } else { owner },
            })
        })
        .collect()
}
