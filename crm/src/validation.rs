//! Client-name checks shown while a pipeline form is being filled in.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::debounce::{DebounceState, Debouncer, DEFAULT_QUIET_PERIOD};
use crate::merge::IdentityKey;
use crate::snapshot::PipelineRow;

/// Inputs shorter than this are not checked.
pub const MIN_CHECK_LEN: usize = 2;
const LISTED_NAMES: usize = 3;

/// Distinct existing client names that contain, or are contained in, the
/// input (case-insensitive). Order of first appearance is kept.
pub fn similar_client_names<'a>(
    existing: impl IntoIterator<Item = &'a str>,
    input: &str,
) -> Vec<String> {
    let needle = input.trim().to_lowercase();
    if needle.chars().count() < MIN_CHECK_LEN {
        return Vec::new();
    }

    let mut names: Vec<String> = Vec::new();
    for name in existing {
        if name.is_empty() {
            continue;
        }
        let lower = name.to_lowercase();
        let similar = lower.contains(&needle) || needle.contains(&lower);
        if similar && !names.iter().any(|known| known == name) {
            names.push(name.to_owned());
        }
    }
    names
}

pub fn similar_clients_message(names: &[String]) -> Option<String> {
    match names.len() {
        0 => None,
        n if n <= LISTED_NAMES => Some(format!("Similar clients exist: {}", names.join(", "))),
        n => Some(format!(
            "Similar clients exist: {} and {} more",
            names[..LISTED_NAMES].join(", "),
            n - LISTED_NAMES
        )),
    }
}

/// Rows whose identity equals (`client_name`, `campaign`), skipping
/// `exclude`.
pub fn exact_duplicates<'a>(
    rows: &'a [PipelineRow],
    client_name: &str,
    campaign: Option<&str>,
    exclude: Option<&str>,
) -> Vec<&'a PipelineRow> {
    let key = IdentityKey::new(client_name, campaign);
    rows.iter()
        .filter(|row| exclude != Some(row.state.unique_id.as_str()))
        .filter(|row| IdentityKey::new(&row.state.client_name, row.state.campaign.as_deref()) == key)
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit { unique_id: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DuplicateStatus {
    #[default]
    Clear,
    /// Non-blocking warning about near-identical client names.
    Similar { names: Vec<String>, message: String },
    /// The identity already exists; creating is blocked.
    Duplicate { unique_ids: Vec<String> },
    /// Saving the edit will fold these pipelines together.
    WillMerge { unique_ids: Vec<String> },
}

impl DuplicateStatus {
    pub fn blocks_submit(&self) -> bool {
        matches!(self, DuplicateStatus::Duplicate { .. })
    }
}

/// Evaluates the client/campaign inputs of a form against loaded rows.
pub fn check_identity(
    rows: &[PipelineRow],
    mode: &FormMode,
    client_name: &str,
    campaign: &str,
) -> DuplicateStatus {
    let client_name = client_name.trim();
    if client_name.chars().count() < MIN_CHECK_LEN {
        return DuplicateStatus::Clear;
    }
    let campaign = Some(campaign.trim());

    match mode {
        FormMode::Create => {
            let duplicates = exact_duplicates(rows, client_name, campaign, None);
            if !duplicates.is_empty() {
                return DuplicateStatus::Duplicate {
                    unique_ids: ids(&duplicates),
                };
            }
            let names = similar_client_names(
                rows.iter().map(|row| row.state.client_name.as_str()),
                client_name,
            );
            match similar_clients_message(&names) {
                Some(message) => DuplicateStatus::Similar { names, message },
                None => DuplicateStatus::Clear,
            }
        }
        FormMode::Edit { unique_id } => {
            let duplicates = exact_duplicates(rows, client_name, campaign, Some(unique_id));
            if duplicates.is_empty() {
                DuplicateStatus::Clear
            } else {
                DuplicateStatus::WillMerge {
                    unique_ids: ids(&duplicates),
                }
            }
        }
    }
}

fn ids(rows: &[&PipelineRow]) -> Vec<String> {
    rows.iter().map(|row| row.state.unique_id.clone()).collect()
}

/// Debounced [`check_identity`] for one open form. Results are published
/// on a watch channel so a renderer can follow the latest status.
#[derive(Debug)]
pub struct DuplicateWatch {
    mode: FormMode,
    debouncer: Debouncer,
    status: Arc<watch::Sender<DuplicateStatus>>,
}

impl DuplicateWatch {
    pub fn new(mode: FormMode) -> Self {
        Self::with_quiet_period(mode, DEFAULT_QUIET_PERIOD)
    }

    pub fn with_quiet_period(mode: FormMode, quiet: Duration) -> Self {
        let (status, _) = watch::channel(DuplicateStatus::Clear);
        Self {
            mode,
            debouncer: Debouncer::new(quiet),
            status: Arc::new(status),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DuplicateStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> DuplicateStatus {
        self.status.borrow().clone()
    }

    pub fn debounce_state(&self) -> DebounceState {
        self.debouncer.state()
    }

    /// Called on every keystroke in the client or campaign field.
    pub fn on_input(&mut self, rows: Arc<[PipelineRow]>, client_name: &str, campaign: &str) {
        if client_name.trim().chars().count() < MIN_CHECK_LEN {
            self.debouncer.cancel();
            self.status.send_replace(DuplicateStatus::Clear);
            return;
        }

        let status = Arc::clone(&self.status);
        let mode = self.mode.clone();
        let client_name = client_name.to_owned();
        let campaign = campaign.to_owned();
        self.debouncer.schedule(async move {
            let next = check_identity(&rows, &mode, &client_name, &campaign);
            status.send_replace(next);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PipelineState;
    use chrono::{TimeZone, Utc};

    fn row(id: &str, client: &str, campaign: Option<&str>) -> PipelineRow {
        PipelineRow {
            state: PipelineState {
                unique_id: id.into(),
                client_name: client.into(),
                campaign: campaign.map(str::to_owned),
                product: "search".into(),
                manager_name: None,
                contact_name: None,
                contact_phone: None,
                contact_email: None,
                action_count: 1,
                last_date: None,
                last_action_type: None,
                current_stage: None,
                current_budget: None,
                last_memo: None,
                created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap().fixed_offset(),
            },
            pipeline_followup: false,
        }
    }

    fn rows() -> Vec<PipelineRow> {
        vec![
            row("P-1", "ABC Corp", Some("Spring")),
            row("P-2", "abc", None),
            row("P-3", "ABC Corp", Some("Summer")),
            row("P-4", "ABCD", None),
            row("P-5", "Zeta", None),
            row("P-6", "ABC Holdings", None),
        ]
    }

    #[test]
    fn similar_names_match_both_directions() {
        let names = similar_client_names(
            ["ABC Corp", "abc", "ABC Corp", "Zeta", ""].into_iter(),
            " ABC corp inc ",
        );
        assert_eq!(names, ["ABC Corp", "abc"]);
        let names = similar_client_names(["ABC Corp", "Zeta"].into_iter(), "ab");
        assert_eq!(names, ["ABC Corp"]);
        assert!(similar_client_names(["ABC"].into_iter(), "a").is_empty());
    }

    #[test]
    fn message_lists_three_then_counts() {
        let names: Vec<String> = ["A1", "A2", "A3", "A4", "A5"].map(String::from).to_vec();
        assert_eq!(
            similar_clients_message(&names).unwrap(),
            "Similar clients exist: A1, A2, A3 and 2 more"
        );
        assert_eq!(
            similar_clients_message(&names[..2]).unwrap(),
            "Similar clients exist: A1, A2"
        );
        assert_eq!(similar_clients_message(&[]), None);
    }

    #[test]
    fn create_mode_blocks_exact_duplicates() {
        let rows = rows();
        let status = check_identity(&rows, &FormMode::Create, " ABC Corp", "Spring ");
        assert_eq!(
            status,
            DuplicateStatus::Duplicate {
                unique_ids: vec!["P-1".into()]
            }
        );
        assert!(status.blocks_submit());

        let status = check_identity(&rows, &FormMode::Create, "abc", "Q4");
        let DuplicateStatus::Similar { names, message } = status else {
            panic!("expected similar warning");
        };
        assert_eq!(names, ["ABC Corp", "abc", "ABCD", "ABC Holdings"]);
        assert_eq!(message, "Similar clients exist: ABC Corp, abc, ABCD and 1 more");
    }

    #[test]
    fn edit_mode_announces_merge_and_skips_self() {
        let rows = rows();
        let mode = FormMode::Edit {
            unique_id: "P-2".into(),
        };
        assert_eq!(check_identity(&rows, &mode, "abc", ""), DuplicateStatus::Clear);
        assert_eq!(
            check_identity(&rows, &mode, "ABC Corp", "Summer"),
            DuplicateStatus::WillMerge {
                unique_ids: vec!["P-3".into()]
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn watch_publishes_after_quiet_period() {
        let rows: Arc<[PipelineRow]> = rows().into();
        let mut form = DuplicateWatch::new(FormMode::Create);
        let mut updates = form.subscribe();

        form.on_input(Arc::clone(&rows), "Ze", "");
        form.on_input(Arc::clone(&rows), "ABC Corp", "Spring");
        assert_eq!(form.status(), DuplicateStatus::Clear);

        updates.changed().await.unwrap();
        assert!(form.status().blocks_submit());

        form.on_input(rows, "A", "");
        assert_eq!(form.status(), DuplicateStatus::Clear);
        assert!(matches!(
            form.debounce_state(),
            DebounceState::Cancelled { generation: 2 } | DebounceState::Fired { generation: 2 }
        ));
    }
}
