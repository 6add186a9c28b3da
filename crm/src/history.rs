//! The derived action history that feeds the metrics engine.

use chrono::NaiveDate;
use entity::action::{self, ActionType, Stage};
use serde::Serialize;

/// Action label as the board reports it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ActionLabel {
    Email,
    #[serde(rename = "Cold Call")]
    ColdCall,
    Meeting,
}

impl ActionLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionLabel::Email => "Email",
            ActionLabel::ColdCall => "Cold Call",
            ActionLabel::Meeting => "Meeting",
        }
    }

    pub fn is_contact(self) -> bool {
        matches!(self, ActionLabel::Email | ActionLabel::ColdCall)
    }
}

impl From<ActionType> for ActionLabel {
    fn from(value: ActionType) -> Self {
        match value {
            ActionType::Email => ActionLabel::Email,
            ActionType::Call => ActionLabel::ColdCall,
            ActionType::Meeting => ActionLabel::Meeting,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum StageLabel {
    Contact,
    Lead,
    Negotiation,
    #[serde(rename = "Closed Won")]
    ClosedWon,
    #[serde(rename = "Closed Lost")]
    ClosedLost,
}

impl StageLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            StageLabel::Contact => "Contact",
            StageLabel::Lead => "Lead",
            StageLabel::Negotiation => "Negotiation",
            StageLabel::ClosedWon => "Closed Won",
            StageLabel::ClosedLost => "Closed Lost",
        }
    }

    /// Lead and Negotiation both count as "in negotiation".
    pub fn is_negotiation(self) -> bool {
        matches!(self, StageLabel::Lead | StageLabel::Negotiation)
    }
}

impl From<Stage> for StageLabel {
    fn from(value: Stage) -> Self {
        match value {
            Stage::Contact => StageLabel::Contact,
            Stage::Lead => StageLabel::Lead,
            Stage::Propose => StageLabel::Negotiation,
            Stage::ClosedWon => StageLabel::ClosedWon,
            Stage::ClosedLost => StageLabel::ClosedLost,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub pipeline_id: String,
    /// Id of the source action; ids grow in recording order.
    pub action_id: i32,
    pub date: Option<NaiveDate>,
    pub action: ActionLabel,
    pub stage: Option<StageLabel>,
    pub budget: i64,
    pub memo: String,
}

impl HistoryEntry {
    pub fn is_contact(&self) -> bool {
        self.action.is_contact()
    }

    pub fn is_meeting(&self) -> bool {
        self.action == ActionLabel::Meeting
    }

    pub fn is_negotiation(&self) -> bool {
        self.stage.is_some_and(StageLabel::is_negotiation)
    }

    pub fn is_closed_won(&self) -> bool {
        self.stage == Some(StageLabel::ClosedWon)
    }
}

impl From<&action::Model> for HistoryEntry {
    fn from(model: &action::Model) -> Self {
        Self {
            pipeline_id: model.pipeline_id.clone(),
            action_id: model.id,
            date: model
                .action_date
                .or_else(|| Some(model.created_at.date_naive())),
            action: model.action_type.into(),
            stage: model.stage.map(StageLabel::from),
            budget: model.budget.max(0),
            memo: model.memo.clone().unwrap_or_default(),
        }
    }
}

/// Rebuilds the history cache; input order is preserved.
pub fn build_history(actions: &[action::Model]) -> Vec<HistoryEntry> {
    actions.iter().map(HistoryEntry::from).collect()
}
