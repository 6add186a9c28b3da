use async_graphql::{Enum, InputObject, SimpleObject};
use chrono::{DateTime, FixedOffset, NaiveDate};
use crm::CrmError;
use crm::board::Board;
use crm::format::{display_name, format_budget, format_phone_number, stage_label};
use crm::listing::{ListFilter, PickerOption, SortState};
use crm::metrics::{MonthlyAggregate, RatePoint};
use crm::service::{
    ActionInput, ActionOutcome, CreatedPipeline, EditOutcome, PipelineInput, parse_budget,
};
use crm::snapshot::PipelineRow;
use crm::validation::DuplicateStatus;
use entity::{action, manager};

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(name = "ActionType", remote = "entity::action::ActionType")]
pub enum ActionTypeKind {
    Email,
    Call,
    Meeting,
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(name = "Stage", remote = "entity::action::Stage")]
pub enum StageKind {
    Contact,
    Lead,
    Propose,
    ClosedWon,
    ClosedLost,
}

#[derive(Enum, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[graphql(name = "Section", remote = "crm::listing::Section")]
pub enum SectionKind {
    Board,
    #[default]
    Active,
    Pipe,
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(name = "SortField", remote = "crm::listing::SortField")]
pub enum SortFieldKind {
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

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(name = "SortDirection", remote = "crm::listing::SortDirection")]
pub enum SortDirectionKind {
    Asc,
    Desc,
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
pub enum IdentityStatus {
    Clear,
    Similar,
    Duplicate,
    WillMerge,
}

#[derive(Clone, Debug, Default, InputObject)]
pub struct PipelineFilterInput {
    #[graphql(default)]
    pub search: String,
    pub product: Option<String>,
    pub owner: Option<String>,
    pub stage: Option<StageKind>,
}

impl From<PipelineFilterInput> for ListFilter {
    fn from(input: PipelineFilterInput) -> Self {
        ListFilter {
            search: input.search,
            product: input.product,
            owner: input.owner,
            stage: input.stage.map(Into::into),
        }
    }
}

#[derive(Clone, Copy, Debug, InputObject)]
pub struct SortInput {
    pub field: SortFieldKind,
    pub direction: SortDirectionKind,
}

impl From<SortInput> for SortState {
    fn from(input: SortInput) -> Self {
        SortState::by(input.field.into(), input.direction.into())
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct PipelineFieldsInput {
    pub client_name: String,
    #[graphql(default)]
    pub campaign: String,
    #[graphql(default)]
    pub product: String,
    #[graphql(default)]
    pub owner_name: String,
    #[graphql(default)]
    pub contact_name: String,
    #[graphql(default)]
    pub contact_phone: String,
    #[graphql(default)]
    pub contact_email: String,
}

impl From<PipelineFieldsInput> for PipelineInput {
    fn from(input: PipelineFieldsInput) -> Self {
        PipelineInput {
            product: input.product,
            owner_name: input.owner_name,
            client_name: input.client_name,
            campaign: input.campaign,
            contact_name: input.contact_name,
            contact_phone: input.contact_phone,
            contact_email: input.contact_email,
        }
    }
}

/// Budget arrives as entered text; thousands separators are accepted.
#[derive(Clone, Debug, InputObject)]
pub struct ActionFieldsInput {
    pub action_type: ActionTypeKind,
    pub stage: Option<StageKind>,
    #[graphql(default)]
    pub budget: String,
    #[graphql(default)]
    pub memo: String,
    #[graphql(default)]
    pub followup: bool,
    pub action_date: Option<NaiveDate>,
}

impl TryFrom<ActionFieldsInput> for ActionInput {
    type Error = CrmError;

    fn try_from(input: ActionFieldsInput) -> Result<Self, Self::Error> {
        Ok(ActionInput {
            action_type: input.action_type.into(),
            stage: input.stage.map(Into::into),
            budget: parse_budget(&input.budget)?,
            memo: input.memo,
            followup: input.followup,
            action_date: input.action_date,
        })
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct NewPipelineInput {
    pub pipeline: PipelineFieldsInput,
    pub action: ActionFieldsInput,
    #[graphql(default)]
    pub followup: bool,
}

#[derive(Clone, Debug, InputObject)]
pub struct EditPipelineInput {
    pub unique_id: String,
    pub pipeline: PipelineFieldsInput,
    #[graphql(default)]
    pub followup: bool,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Pipeline")]
pub struct PipelineNode {
    pub unique_id: String,
    pub display_name: String,
    pub client_name: String,
    pub campaign: Option<String>,
    pub product: String,
    pub owner: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_phone_display: String,
    pub contact_email: Option<String>,
    pub action_count: i64,
    pub last_date: Option<NaiveDate>,
    pub last_action_type: Option<ActionTypeKind>,
    pub current_stage: Option<StageKind>,
    pub current_stage_label: Option<String>,
    pub current_budget: Option<i64>,
    pub current_budget_display: String,
    pub last_memo: Option<String>,
    pub followup: bool,
    pub created_at: DateTime<FixedOffset>,
}

impl From<&PipelineRow> for PipelineNode {
    fn from(row: &PipelineRow) -> Self {
        let state = row.state.clone();
        Self {
            display_name: display_name(&state.client_name, state.campaign.as_deref()),
            contact_phone_display: format_phone_number(state.contact_phone.as_deref()),
            current_stage_label: state.current_stage.map(|s| stage_label(s).to_string()),
            current_budget_display: format_budget(state.current_budget),
            unique_id: state.unique_id,
            client_name: state.client_name,
            campaign: state.campaign,
            product: state.product,
            owner: state.manager_name,
            contact_name: state.contact_name,
            contact_phone: state.contact_phone,
            contact_email: state.contact_email,
            action_count: state.action_count,
            last_date: state.last_date,
            last_action_type: state.last_action_type.map(Into::into),
            current_stage: state.current_stage.map(Into::into),
            current_budget: state.current_budget,
            last_memo: state.last_memo,
            followup: row.pipeline_followup,
            created_at: state.created_at,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Action")]
pub struct ActionNode {
    pub id: i32,
    pub pipeline_id: String,
    pub action_type: ActionTypeKind,
    pub stage: Option<StageKind>,
    pub budget: i64,
    pub memo: Option<String>,
    pub followup: bool,
    pub action_date: Option<NaiveDate>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

impl From<action::Model> for ActionNode {
    fn from(model: action::Model) -> Self {
        Self {
            id: model.id,
            pipeline_id: model.pipeline_id,
            action_type: model.action_type.into(),
            stage: model.stage.map(Into::into),
            budget: model.budget,
            memo: model.memo,
            followup: model.action_followup,
            action_date: model.action_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Owner")]
pub struct OwnerNode {
    pub id: i32,
    pub name: String,
    pub team: Option<String>,
}

impl From<manager::Model> for OwnerNode {
    fn from(model: manager::Model) -> Self {
        Self {
            id: model.id,
            name: model.manager_name,
            team: model.manager_team,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "PickerOption")]
pub struct PickerOptionNode {
    pub unique_id: String,
    pub display_name: String,
    pub owner: String,
}

impl From<PickerOption> for PickerOptionNode {
    fn from(option: PickerOption) -> Self {
        Self {
            unique_id: option.unique_id,
            display_name: option.display_name,
            owner: option.owner,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "MonthlyAggregate")]
pub struct MonthlyNode {
    pub period: String,
    pub contacts: u32,
    pub meetings: u32,
    pub negotiations: u32,
    pub closed_won: u32,
    pub budget_sum: i64,
    pub won_budget: i64,
}

impl From<MonthlyAggregate> for MonthlyNode {
    fn from(value: MonthlyAggregate) -> Self {
        Self {
            period: value.period,
            contacts: value.contacts,
            meetings: value.meetings,
            negotiations: value.negotiations,
            closed_won: value.closed_won,
            budget_sum: value.budget_sum,
            won_budget: value.won_budget,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "RatePoint")]
pub struct RatePointNode {
    pub period: String,
    pub rate: f64,
}

impl From<RatePoint> for RatePointNode {
    fn from(value: RatePoint) -> Self {
        Self {
            period: value.period,
            rate: value.rate,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Board")]
pub struct BoardNode {
    pub period: String,
    pub current: MonthlyNode,
    pub trend: Vec<MonthlyNode>,
    pub meeting_conversion: Vec<RatePointNode>,
    pub booking_rate: Vec<RatePointNode>,
    pub current_meeting_conversion: f64,
    pub current_booking_rate: f64,
}

impl From<Board> for BoardNode {
    fn from(board: Board) -> Self {
        Self {
            period: board.period,
            current: board.current.into(),
            trend: board.trend.into_iter().map(Into::into).collect(),
            meeting_conversion: board.meeting_conversion.into_iter().map(Into::into).collect(),
            booking_rate: board.booking_rate.into_iter().map(Into::into).collect(),
            current_meeting_conversion: board.current_meeting_conversion,
            current_booking_rate: board.current_booking_rate,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct ClientCheck {
    pub status: IdentityStatus,
    pub blocks_submit: bool,
    pub names: Vec<String>,
    pub message: Option<String>,
    pub unique_ids: Vec<String>,
}

impl From<DuplicateStatus> for ClientCheck {
    fn from(status: DuplicateStatus) -> Self {
        let blocks_submit = status.blocks_submit();
        let (status, names, message, unique_ids) = match status {
            DuplicateStatus::Clear => (IdentityStatus::Clear, Vec::new(), None, Vec::new()),
            DuplicateStatus::Similar { names, message } => {
                (IdentityStatus::Similar, names, Some(message), Vec::new())
            }
            DuplicateStatus::Duplicate { unique_ids } => {
                (IdentityStatus::Duplicate, Vec::new(), None, unique_ids)
            }
            DuplicateStatus::WillMerge { unique_ids } => {
                (IdentityStatus::WillMerge, Vec::new(), None, unique_ids)
            }
        };
        Self {
            status,
            blocks_submit,
            names,
            message,
            unique_ids,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct CreatePipelinePayload {
    pub unique_id: String,
    pub warnings: Vec<String>,
}

impl From<CreatedPipeline> for CreatePipelinePayload {
    fn from(created: CreatedPipeline) -> Self {
        Self {
            unique_id: created.unique_id,
            warnings: created.warnings,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct ActionPayload {
    pub action: ActionNode,
    pub pipeline_followup: bool,
}

impl From<ActionOutcome> for ActionPayload {
    fn from(outcome: ActionOutcome) -> Self {
        Self {
            action: outcome.action.into(),
            pipeline_followup: outcome.pipeline_followup,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct EditPipelinePayload {
    pub survivor_id: String,
    pub absorbed: Vec<String>,
    pub merged: bool,
    pub followup: bool,
}

impl From<EditOutcome> for EditPipelinePayload {
    fn from(outcome: EditOutcome) -> Self {
        Self {
            survivor_id: outcome.survivor_id,
            absorbed: outcome.absorbed,
            merged: outcome.merged,
            followup: outcome.followup,
        }
    }
}
