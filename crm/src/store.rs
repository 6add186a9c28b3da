//! Data access over the pipeline, action and manager tables and the
//! `crm_pipeline_current_state` view.

use async_trait::async_trait;
use chrono::NaiveDate;
use entity::action::{self, ActionType, Stage};
use entity::{manager, pipeline};
use sea_orm::ActiveValue::{NotSet, Set, Unchanged};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, Statement,
};
use serde::Serialize;
use tracing::warn;

use crate::error::{CrmError, CrmResult};

pub type Timestamp = sea_orm::prelude::DateTimeWithTimeZone;

const CURRENT_STATE_SQL: &str = "SELECT unique_id, client_name, campaign, product, manager_name, \
     contact_name, contact_phone, contact_email, action_count, last_date, last_action_type, \
     current_stage, current_budget, last_memo, created_at \
     FROM crm_pipeline_current_state ORDER BY created_at DESC, unique_id DESC";

/// One row of the current-state view.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub unique_id: String,
    pub client_name: String,
    pub campaign: Option<String>,
    pub product: String,
    pub manager_name: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub action_count: i64,
    pub last_date: Option<NaiveDate>,
    pub last_action_type: Option<ActionType>,
    pub current_stage: Option<Stage>,
    pub current_budget: Option<i64>,
    pub last_memo: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, FromQueryResult)]
struct CurrentStateRow {
    unique_id: String,
    client_name: String,
    campaign: Option<String>,
    product: String,
    manager_name: Option<String>,
    contact_name: Option<String>,
    contact_phone: Option<String>,
    contact_email: Option<String>,
    action_count: i64,
    last_date: Option<NaiveDate>,
    last_action_type: Option<String>,
    current_stage: Option<String>,
    current_budget: Option<i64>,
    last_memo: Option<String>,
    created_at: Timestamp,
}

impl From<CurrentStateRow> for PipelineState {
    fn from(row: CurrentStateRow) -> Self {
        let last_action_type = decode_enum::<ActionType>(&row.unique_id, row.last_action_type);
        let current_stage = decode_enum::<Stage>(&row.unique_id, row.current_stage);
        Self {
            unique_id: row.unique_id,
            client_name: row.client_name,
            campaign: row.campaign,
            product: row.product,
            manager_name: row.manager_name,
            contact_name: row.contact_name,
            contact_phone: row.contact_phone,
            contact_email: row.contact_email,
            action_count: row.action_count,
            last_date: row.last_date,
            last_action_type,
            current_stage,
            current_budget: row.current_budget,
            last_memo: row.last_memo,
            created_at: row.created_at,
        }
    }
}

fn decode_enum<E>(unique_id: &str, raw: Option<String>) -> Option<E>
where
    E: ActiveEnum<Value = String>,
{
    let raw = raw?;
    match E::try_from_value(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(unique_id, value = %raw, error = %err, "unrecognised enum value in current state");
            None
        }
    }
}

/// Editable pipeline fields. `created_at` and `unique_id` are never part of
/// an update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelinePatch {
    pub product: String,
    pub client_name: String,
    pub campaign: Option<String>,
    pub manager_id: Option<i32>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
}

/// Writable action fields shared by insert and update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionFields {
    pub action_type: ActionType,
    pub stage: Option<Stage>,
    pub budget: i64,
    pub memo: Option<String>,
    pub action_followup: bool,
    pub action_date: NaiveDate,
}

#[async_trait]
pub trait CrmStore: Send + Sync {
    /// View rows, newest pipeline first.
    async fn current_state(&self) -> CrmResult<Vec<PipelineState>>;
    /// All pipelines, oldest first.
    async fn pipelines(&self) -> CrmResult<Vec<pipeline::Model>>;
    async fn pipeline(&self, unique_id: &str) -> CrmResult<Option<pipeline::Model>>;
    async fn insert_pipeline(&self, model: pipeline::Model) -> CrmResult<pipeline::Model>;
    async fn update_pipeline(
        &self,
        unique_id: &str,
        patch: PipelinePatch,
        at: Timestamp,
    ) -> CrmResult<pipeline::Model>;
    async fn set_pipeline_followup(&self, unique_id: &str, followup: bool) -> CrmResult<()>;
    async fn delete_pipeline(&self, unique_id: &str) -> CrmResult<()>;

    /// Every action, newest `action_date` first.
    async fn actions(&self) -> CrmResult<Vec<action::Model>>;
    async fn actions_for(&self, pipeline_id: &str) -> CrmResult<Vec<action::Model>>;
    async fn action(&self, id: i32) -> CrmResult<Option<action::Model>>;
    /// Most recently created action of a pipeline.
    async fn latest_action(&self, pipeline_id: &str) -> CrmResult<Option<action::Model>>;
    async fn insert_action(
        &self,
        pipeline_id: &str,
        fields: ActionFields,
        at: Timestamp,
    ) -> CrmResult<action::Model>;
    async fn update_action(
        &self,
        id: i32,
        fields: ActionFields,
        at: Timestamp,
    ) -> CrmResult<action::Model>;
    /// Moves every action of `from` onto `to`, returning how many moved.
    async fn reassign_actions(&self, from: &str, to: &str) -> CrmResult<u64>;

    /// Managers sorted by name.
    async fn managers(&self) -> CrmResult<Vec<manager::Model>>;
    async fn manager_by_name(&self, name: &str) -> CrmResult<Option<manager::Model>>;
}

/// `CrmStore` over any sea-orm connection, including an open transaction.
pub struct SeaOrmStore<'a, C> {
    conn: &'a C,
}

impl<'a, C> SeaOrmStore<'a, C>
where
    C: ConnectionTrait,
{
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }
}

fn not_updated(what: String) -> impl FnOnce(DbErr) -> CrmError {
    move |err| match err {
        DbErr::RecordNotUpdated => CrmError::NotFound(what),
        other => CrmError::Db(other),
    }
}

#[async_trait]
impl<C> CrmStore for SeaOrmStore<'_, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn current_state(&self) -> CrmResult<Vec<PipelineState>> {
        let statement = Statement::from_string(self.conn.get_database_backend(), CURRENT_STATE_SQL);
        let rows = CurrentStateRow::find_by_statement(statement)
            .all(self.conn)
            .await?;
        Ok(rows.into_iter().map(PipelineState::from).collect())
    }

    async fn pipelines(&self) -> CrmResult<Vec<pipeline::Model>> {
        Ok(pipeline::Entity::find()
            .order_by_asc(pipeline::Column::CreatedAt)
            .order_by_asc(pipeline::Column::UniqueId)
            .all(self.conn)
            .await?)
    }

    async fn pipeline(&self, unique_id: &str) -> CrmResult<Option<pipeline::Model>> {
        Ok(pipeline::Entity::find_by_id(unique_id.to_owned())
            .one(self.conn)
            .await?)
    }

    async fn insert_pipeline(&self, model: pipeline::Model) -> CrmResult<pipeline::Model> {
        let active = pipeline::ActiveModel {
            unique_id: Set(model.unique_id),
            product: Set(model.product),
            client_name: Set(model.client_name),
            campaign: Set(model.campaign),
            manager_id: Set(model.manager_id),
            contact_name: Set(model.contact_name),
            contact_phone: Set(model.contact_phone),
            contact_email: Set(model.contact_email),
            pipeline_followup: Set(model.pipeline_followup),
            created_at: Set(model.created_at),
            updated_at: Set(model.updated_at),
        };
        Ok(active.insert(self.conn).await?)
    }

    async fn update_pipeline(
        &self,
        unique_id: &str,
        patch: PipelinePatch,
        at: Timestamp,
    ) -> CrmResult<pipeline::Model> {
        let active = pipeline::ActiveModel {
            unique_id: Unchanged(unique_id.to_owned()),
            product: Set(patch.product),
            client_name: Set(patch.client_name),
            campaign: Set(patch.campaign),
            manager_id: Set(patch.manager_id),
            contact_name: Set(patch.contact_name),
            contact_phone: Set(patch.contact_phone),
            contact_email: Set(patch.contact_email),
            updated_at: Set(at),
            ..Default::default()
        };
        active
            .update(self.conn)
            .await
            .map_err(not_updated(format!("pipeline {unique_id}")))
    }

    async fn set_pipeline_followup(&self, unique_id: &str, followup: bool) -> CrmResult<()> {
        let active = pipeline::ActiveModel {
            unique_id: Unchanged(unique_id.to_owned()),
            pipeline_followup: Set(followup),
            ..Default::default()
        };
        active
            .update(self.conn)
            .await
            .map_err(not_updated(format!("pipeline {unique_id}")))?;
        Ok(())
    }

    async fn delete_pipeline(&self, unique_id: &str) -> CrmResult<()> {
        let result = pipeline::Entity::delete_by_id(unique_id.to_owned())
            .exec(self.conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(CrmError::not_found(format!("pipeline {unique_id}")));
        }
        Ok(())
    }

    async fn actions(&self) -> CrmResult<Vec<action::Model>> {
        Ok(action::Entity::find()
            .order_by_desc(action::Column::ActionDate)
            .order_by_desc(action::Column::CreatedAt)
            .order_by_desc(action::Column::Id)
            .all(self.conn)
            .await?)
    }

    async fn actions_for(&self, pipeline_id: &str) -> CrmResult<Vec<action::Model>> {
        Ok(action::Entity::find()
            .filter(action::Column::PipelineId.eq(pipeline_id))
            .order_by_desc(action::Column::ActionDate)
            .order_by_desc(action::Column::CreatedAt)
            .order_by_desc(action::Column::Id)
            .all(self.conn)
            .await?)
    }

    async fn action(&self, id: i32) -> CrmResult<Option<action::Model>> {
        Ok(action::Entity::find_by_id(id).one(self.conn).await?)
    }

    async fn latest_action(&self, pipeline_id: &str) -> CrmResult<Option<action::Model>> {
        Ok(action::Entity::find()
            .filter(action::Column::PipelineId.eq(pipeline_id))
            .order_by_desc(action::Column::CreatedAt)
            .order_by_desc(action::Column::Id)
            .one(self.conn)
            .await?)
    }

    async fn insert_action(
        &self,
        pipeline_id: &str,
        fields: ActionFields,
        at: Timestamp,
    ) -> CrmResult<action::Model> {
        let active = action::ActiveModel {
            id: NotSet,
            pipeline_id: Set(pipeline_id.to_owned()),
            action_type: Set(fields.action_type),
            stage: Set(fields.stage),
            budget: Set(fields.budget),
            memo: Set(fields.memo),
            action_followup: Set(fields.action_followup),
            action_date: Set(Some(fields.action_date)),
            created_at: Set(at),
            updated_at: Set(at),
        };
        Ok(active.insert(self.conn).await?)
    }

    async fn update_action(
        &self,
        id: i32,
        fields: ActionFields,
        at: Timestamp,
    ) -> CrmResult<action::Model> {
        let active = action::ActiveModel {
            id: Unchanged(id),
            action_type: Set(fields.action_type),
            stage: Set(fields.stage),
            budget: Set(fields.budget),
            memo: Set(fields.memo),
            action_followup: Set(fields.action_followup),
            action_date: Set(Some(fields.action_date)),
            updated_at: Set(at),
            ..Default::default()
        };
        active
            .update(self.conn)
            .await
            .map_err(not_updated(format!("action {id}")))
    }

    async fn reassign_actions(&self, from: &str, to: &str) -> CrmResult<u64> {
        let result = action::Entity::update_many()
            .col_expr(action::Column::PipelineId, Expr::value(to.to_owned()))
            .filter(action::Column::PipelineId.eq(from))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn managers(&self) -> CrmResult<Vec<manager::Model>> {
        Ok(manager::Entity::find()
            .order_by_asc(manager::Column::ManagerName)
            .order_by_asc(manager::Column::Id)
            .all(self.conn)
            .await?)
    }

    async fn manager_by_name(&self, name: &str) -> CrmResult<Option<manager::Model>> {
        Ok(manager::Entity::find()
            .filter(manager::Column::ManagerName.eq(name))
            .order_by_asc(manager::Column::Id)
            .one(self.conn)
            .await?)
    }
}
