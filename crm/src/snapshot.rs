//! The in-memory view of the store that lists and boards are rendered from.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use entity::{action, pipeline};
use serde::Serialize;
use tracing::{error, info_span, warn, Instrument};

use crate::board::{Board, DEFAULT_BOARD_MONTHS};
use crate::error::CrmResult;
use crate::history::{HistoryEntry, build_history};
use crate::listing::{
    ListFilter, ListState, PickerOption, Section, SortField, SortState, owner_filter_options,
    picker_options, visible_rows,
};
use crate::store::{CrmStore, PipelineState};

/// A current-state row with its follow-up flag.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRow {
    #[serde(flatten)]
    pub state: PipelineState,
    pub pipeline_followup: bool,
}

/// Everything loaded by one refresh. Never patched in place; a reload
/// replaces the whole value.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pipelines: Arc<[PipelineRow]>,
    history: Arc<[HistoryEntry]>,
}

impl Snapshot {
    pub async fn load<S>(store: &S) -> CrmResult<Self>
    where
        S: CrmStore + ?Sized,
    {
        let (states, actions, pipelines) = tokio::try_join!(
            store.current_state(),
            store.actions(),
            store.pipelines()
        )?;
        Ok(Self::from_parts(states, &actions, &pipelines))
    }

    /// Joins view rows with the follow-up flags of the pipeline table.
    /// Rows without a pipeline record read as not flagged.
    pub fn from_parts(
        states: Vec<PipelineState>,
        actions: &[action::Model],
        pipelines: &[pipeline::Model],
    ) -> Self {
        let followups: HashMap<&str, bool> = pipelines
            .iter()
            .map(|p| (p.unique_id.as_str(), p.pipeline_followup))
            .collect();
        let rows: Vec<PipelineRow> = states
            .into_iter()
            .map(|state| {
                let pipeline_followup = followups
                    .get(state.unique_id.as_str())
                    .copied()
                    .unwrap_or(false);
                PipelineRow {
                    state,
                    pipeline_followup,
                }
            })
            .collect();

        Self {
            pipelines: rows.into(),
            history: build_history(actions).into(),
        }
    }

    pub fn pipelines(&self) -> &[PipelineRow] {
        &self.pipelines
    }

    /// Shared handle for work that outlives a borrow, such as debounced
    /// validation.
    pub fn shared_pipelines(&self) -> Arc<[PipelineRow]> {
        Arc::clone(&self.pipelines)
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn find(&self, unique_id: &str) -> Option<&PipelineRow> {
        self.pipelines
            .iter()
            .find(|row| row.state.unique_id == unique_id)
    }
}

/// Per-client dashboard state: the latest snapshot plus list settings.
#[derive(Clone, Debug)]
pub struct Dashboard {
    snapshot: Snapshot,
    list: ListState,
    board_months: usize,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new(DEFAULT_BOARD_MONTHS)
    }
}

impl Dashboard {
    pub fn new(board_months: usize) -> Self {
        Self {
            snapshot: Snapshot::default(),
            list: ListState::default(),
            board_months,
        }
    }

    pub async fn reload<S>(&mut self, store: &S) -> CrmResult<()>
    where
        S: CrmStore + ?Sized,
    {
        let snapshot = Snapshot::load(store)
            .instrument(info_span!("crm.reload"))
            .await
            .inspect_err(|err| error!(error = %err, "failed to load pipeline snapshot"))?;
        self.snapshot = snapshot;
        Ok(())
    }

    /// Runs a write and then reloads, whether or not the write succeeded.
    /// A failed write is returned even when the reload also fails.
    pub async fn mutate<S, T, F>(&mut self, store: &S, mutation: F) -> CrmResult<T>
    where
        S: CrmStore + ?Sized,
        F: Future<Output = CrmResult<T>>,
    {
        let outcome = mutation.await;
        if let Err(err) = &outcome {
            warn!(error = %err, requires_reload = err.requires_reload(), "mutation failed");
        }
        let reloaded = self.reload(store).await;
        match (outcome, reloaded) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn list_state(&self) -> &ListState {
        &self.list
    }

    pub fn rows(&self) -> Vec<&PipelineRow> {
        visible_rows(self.snapshot.pipelines(), &self.list)
    }

    pub fn board(&self, today: NaiveDate) -> Board {
        Board::compute(self.snapshot.history(), today, self.board_months)
    }

    pub fn toggle_sort(&mut self, field: SortField) {
        self.list.sort.toggle(field);
    }

    pub fn set_sort(&mut self, sort: SortState) {
        self.list.sort = sort;
    }

    pub fn set_section(&mut self, section: Section) {
        self.list.section = section;
    }

    pub fn set_filters(&mut self, filter: ListFilter) {
        self.list.filter = filter;
    }

    pub fn owner_filter_options(&self) -> Vec<String> {
        owner_filter_options(self.snapshot.pipelines())
    }

    pub fn picker_options(&self, term: &str) -> Vec<PickerOption> {
        picker_options(self.snapshot.pipelines(), term)
    }
}
