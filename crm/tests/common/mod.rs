#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use crm::clock::Clock;
use crm::error::{CrmError, CrmResult};
use crm::seed::{SeededCrm, seed_demo};
use crm::service::{ActionInput, NewPipeline, PipelineInput};
use crm::store::{ActionFields, CrmStore, PipelinePatch, PipelineState, SeaOrmStore, Timestamp};
use entity::action::{self, ActionType, Stage};
use entity::{manager, pipeline};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection, DbErr};

pub async fn migrated_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect sqlite");
    Migrator::up(&db, None).await.expect("run migrations");
    db
}

pub async fn seeded_db() -> (DatabaseConnection, SeededCrm) {
    let db = migrated_db().await;
    let seeded = seed_demo(&db).await.expect("seed demo data");
    (db, seeded)
}

pub fn instant(year: i32, month: u32, day: u32) -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(year, month, day, 10, 0, 0)
        .unwrap()
        .fixed_offset()
}

pub fn clock_at(year: i32, month: u32, day: u32) -> Clock {
    Clock::fixed(instant(year, month, day))
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn action_input(action_type: ActionType, stage: Option<Stage>, followup: bool) -> ActionInput {
    ActionInput {
        action_type,
        stage,
        budget: 0,
        memo: String::new(),
        followup,
        action_date: None,
    }
}

pub fn new_pipeline(client: &str, campaign: &str) -> NewPipeline {
    NewPipeline {
        pipeline: PipelineInput {
            product: "display".into(),
            client_name: client.into(),
            campaign: campaign.into(),
            ..PipelineInput::default()
        },
        action: action_input(ActionType::Email, Some(Stage::Contact), false),
        followup: false,
    }
}

pub fn pipeline_input(client: &str, campaign: &str) -> PipelineInput {
    PipelineInput {
        product: "search".into(),
        client_name: client.into(),
        campaign: campaign.into(),
        contact_name: "Dana".into(),
        ..PipelineInput::default()
    }
}

/// Wraps a store and fails `delete_pipeline` for one id.
pub struct FailingDelete<S> {
    pub inner: S,
    pub fail_on: String,
}

#[async_trait]
impl<S: CrmStore> CrmStore for FailingDelete<S> {
    async fn current_state(&self) -> CrmResult<Vec<PipelineState>> {
        self.inner.current_state().await
    }

    async fn pipelines(&self) -> CrmResult<Vec<pipeline::Model>> {
        self.inner.pipelines().await
    }

    async fn pipeline(&self, unique_id: &str) -> CrmResult<Option<pipeline::Model>> {
        self.inner.pipeline(unique_id).await
    }

    async fn insert_pipeline(&self, model: pipeline::Model) -> CrmResult<pipeline::Model> {
        self.inner.insert_pipeline(model).await
    }

    async fn update_pipeline(
        &self,
        unique_id: &str,
        patch: PipelinePatch,
        at: Timestamp,
    ) -> CrmResult<pipeline::Model> {
        self.inner.update_pipeline(unique_id, patch, at).await
    }

    async fn set_pipeline_followup(&self, unique_id: &str, followup: bool) -> CrmResult<()> {
        self.inner.set_pipeline_followup(unique_id, followup).await
    }

    async fn delete_pipeline(&self, unique_id: &str) -> CrmResult<()> {
        if unique_id == self.fail_on {
            return Err(CrmError::Db(DbErr::Custom("connection reset".into())));
        }
        self.inner.delete_pipeline(unique_id).await
    }

    async fn actions(&self) -> CrmResult<Vec<action::Model>> {
        self.inner.actions().await
    }

    async fn actions_for(&self, pipeline_id: &str) -> CrmResult<Vec<action::Model>> {
        self.inner.actions_for(pipeline_id).await
    }

    async fn action(&self, id: i32) -> CrmResult<Option<action::Model>> {
        self.inner.action(id).await
    }

    async fn latest_action(&self, pipeline_id: &str) -> CrmResult<Option<action::Model>> {
        self.inner.latest_action(pipeline_id).await
    }

    async fn insert_action(
        &self,
        pipeline_id: &str,
        fields: ActionFields,
        at: Timestamp,
    ) -> CrmResult<action::Model> {
        self.inner.insert_action(pipeline_id, fields, at).await
    }

    async fn update_action(
        &self,
        id: i32,
        fields: ActionFields,
        at: Timestamp,
    ) -> CrmResult<action::Model> {
        self.inner.update_action(id, fields, at).await
    }

    async fn reassign_actions(&self, from: &str, to: &str) -> CrmResult<u64> {
        self.inner.reassign_actions(from, to).await
    }

    async fn managers(&self) -> CrmResult<Vec<manager::Model>> {
        self.inner.managers().await
    }

    async fn manager_by_name(&self, name: &str) -> CrmResult<Option<manager::Model>> {
        self.inner.manager_by_name(name).await
    }
}

pub fn store(db: &DatabaseConnection) -> SeaOrmStore<'_, DatabaseConnection> {
    SeaOrmStore::new(db)
}
