use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "crm_client_actions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub pipeline_id: String,
    pub action_type: ActionType,
    pub stage: Option<Stage>,
    pub budget: i64,
    pub memo: Option<String>,
    pub action_followup: bool,
    pub action_date: Option<Date>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pipeline::Entity",
        from = "Column::PipelineId",
        to = "super::pipeline::Column::UniqueId"
    )]
    Pipeline,
}

impl Related<super::pipeline::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pipeline.def()
    }
}

#[derive(
    Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    #[sea_orm(string_value = "email")]
    Email,
    #[sea_orm(string_value = "call")]
    Call,
    #[sea_orm(string_value = "meeting")]
    Meeting,
}

/// Funnel position recorded with each action.
#[derive(
    Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[sea_orm(string_value = "contact")]
    Contact,
    #[sea_orm(string_value = "lead")]
    Lead,
    #[sea_orm(string_value = "propose")]
    Propose,
    #[sea_orm(string_value = "closed_won")]
    ClosedWon,
    #[sea_orm(string_value = "closed_lost")]
    ClosedLost,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Email => "email",
            ActionType::Call => "call",
            ActionType::Meeting => "meeting",
        }
    }
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Contact => "contact",
            Stage::Lead => "lead",
            Stage::Propose => "propose",
            Stage::ClosedWon => "closed_won",
            Stage::ClosedLost => "closed_lost",
        }
    }
}

impl ActiveModelBehavior for ActiveModel {}
