mod types;

use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, ErrorExtensions, Object, Result, Schema, SimpleObject};
use chrono::NaiveDate;
use crm::listing::{ListState, SortState, picker_options, visible_rows};
use crm::service::{self, ActionInput, ActionTarget, EditPipeline, NewPipeline};
use crm::validation::{FormMode, check_identity};
use crm::{Board, CrmError, CrmResult, SeaOrmStore, Snapshot};
use platform_api::{ApiError, internal_error, validation_error};
use platform_db::DbPool;
use sea_orm::{DatabaseTransaction, TransactionTrait};
use serde::Serialize;
use tracing::{error, instrument};

use crate::config::CrmSettings;

pub use types::*;

pub type SchemaType = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(db: Arc<DbPool>, settings: CrmSettings) -> SchemaType {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(db)
        .data(settings)
        .finish()
}

/// SDL of the schema; needs no database.
pub fn schema_sdl() -> String {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .finish()
        .sdl()
}

#[derive(Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    #[instrument(name = "graphql.health", skip_all)]
    async fn health(&self) -> Result<HealthPayload> {
        Ok(HealthPayload { ok: true })
    }

    #[instrument(name = "graphql.version", skip_all)]
    async fn version(&self) -> Result<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }

    async fn crm(&self) -> CrmQuery {
        CrmQuery
    }
}

#[derive(Default)]
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn crm(&self) -> CrmMutation {
        CrmMutation
    }
}

#[derive(Clone, Debug, SimpleObject, Serialize)]
pub struct HealthPayload {
    pub ok: bool,
}

#[derive(Default)]
pub struct CrmQuery;

#[Object]
impl CrmQuery {
    /// Pipelines of one section after filters and sorting.
    #[instrument(name = "graphql.crm.pipelines", skip_all)]
    async fn pipelines(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] section: SectionKind,
        filter: Option<PipelineFilterInput>,
        sort: Option<SortInput>,
    ) -> Result<Vec<PipelineNode>> {
        let snapshot = load_snapshot(ctx).await?;
        let state = ListState {
            section: section.into(),
            filter: filter.unwrap_or_default().into(),
            sort: sort.map(SortState::from).unwrap_or_default(),
        };
        Ok(visible_rows(snapshot.pipelines(), &state)
            .into_iter()
            .map(PipelineNode::from)
            .collect())
    }

    #[instrument(name = "graphql.crm.pipeline", skip_all)]
    async fn pipeline(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "uniqueId")] unique_id: String,
    ) -> Result<Option<PipelineNode>> {
        let snapshot = load_snapshot(ctx).await?;
        Ok(snapshot.find(&unique_id).map(PipelineNode::from))
    }

    /// Earlier actions of a pipeline, newest first, without the latest one.
    #[instrument(name = "graphql.crm.pipelineHistory", skip_all)]
    async fn pipeline_history(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "uniqueId")] unique_id: String,
    ) -> Result<Vec<ActionNode>> {
        let db = database(ctx)?;
        let actions = service::pipeline_history(&SeaOrmStore::new(db.as_ref()), &unique_id)
            .await
            .map_err(crm_error)?;
        Ok(actions.into_iter().map(ActionNode::from).collect())
    }

    #[instrument(name = "graphql.crm.board", skip_all)]
    async fn board(&self, ctx: &Context<'_>, today: Option<NaiveDate>) -> Result<BoardNode> {
        let settings = settings(ctx)?;
        let snapshot = load_snapshot(ctx).await?;
        let today = today.unwrap_or_else(|| settings.clock.today());
        Ok(Board::compute(snapshot.history(), today, settings.board_months).into())
    }

    /// Managers that may own a pipeline.
    #[instrument(name = "graphql.crm.owners", skip_all)]
    async fn owners(&self, ctx: &Context<'_>) -> Result<Vec<OwnerNode>> {
        let db = database(ctx)?;
        let settings = settings(ctx)?;
        let managers = service::owner_options(
            &SeaOrmStore::new(db.as_ref()),
            &settings.owner_team,
            &settings.owner_excluded_ids,
        )
        .await
        .map_err(crm_error)?;
        Ok(managers.into_iter().map(OwnerNode::from).collect())
    }

    #[instrument(name = "graphql.crm.ownerFilterOptions", skip_all)]
    async fn owner_filter_options(&self, ctx: &Context<'_>) -> Result<Vec<String>> {
        let snapshot = load_snapshot(ctx).await?;
        Ok(crm::listing::owner_filter_options(snapshot.pipelines()))
    }

    #[instrument(name = "graphql.crm.pipelinePicker", skip_all)]
    async fn pipeline_picker(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] term: String,
    ) -> Result<Vec<PickerOptionNode>> {
        let snapshot = load_snapshot(ctx).await?;
        Ok(picker_options(snapshot.pipelines(), &term)
            .into_iter()
            .map(PickerOptionNode::from)
            .collect())
    }

    /// Duplicate and similar-name check for a client/campaign form.
    #[instrument(name = "graphql.crm.checkClient", skip_all)]
    async fn check_client(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "clientName")] client_name: String,
        #[graphql(default)] campaign: String,
        #[graphql(name = "editingId")] editing_id: Option<String>,
    ) -> Result<ClientCheck> {
        let snapshot = load_snapshot(ctx).await?;
        let mode = match editing_id {
            Some(unique_id) => FormMode::Edit { unique_id },
            None => FormMode::Create,
        };
        Ok(check_identity(snapshot.pipelines(), &mode, &client_name, &campaign).into())
    }
}

#[derive(Default)]
pub struct CrmMutation;

#[Object]
impl CrmMutation {
    #[instrument(name = "graphql.crm.createPipeline", skip_all)]
    async fn create_pipeline(
        &self,
        ctx: &Context<'_>,
        input: NewPipelineInput,
    ) -> Result<CreatePipelinePayload> {
        let db = database(ctx)?;
        let settings = settings(ctx)?;
        let input = NewPipeline {
            pipeline: input.pipeline.into(),
            action: input.action.try_into().map_err(crm_error)?,
            followup: input.followup,
        };
        let txn = db.begin().await.map_err(internal_error)?;
        let outcome =
            service::create_pipeline(&SeaOrmStore::new(&txn), &settings.clock, input).await;
        finish(txn, outcome).await.map(Into::into)
    }

    #[instrument(name = "graphql.crm.recordAction", skip_all)]
    async fn record_action(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "pipelineId")] pipeline_id: String,
        input: ActionFieldsInput,
    ) -> Result<ActionPayload> {
        let input: ActionInput = input.try_into().map_err(crm_error)?;
        let db = database(ctx)?;
        let settings = settings(ctx)?;
        let txn = db.begin().await.map_err(internal_error)?;
        let outcome = service::record_action(
            &SeaOrmStore::new(&txn),
            &settings.clock,
            &pipeline_id,
            input,
        )
        .await;
        finish(txn, outcome).await.map(Into::into)
    }

    /// Edits one action; with only `pipelineId` the latest action is edited.
    #[instrument(name = "graphql.crm.editAction", skip_all)]
    async fn edit_action(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "actionId")] action_id: Option<i32>,
        #[graphql(name = "pipelineId")] pipeline_id: Option<String>,
        input: ActionFieldsInput,
    ) -> Result<ActionPayload> {
        let target = match (action_id, pipeline_id) {
            (Some(id), _) => ActionTarget::Action(id),
            (None, Some(pipeline_id)) => ActionTarget::LatestOf(pipeline_id),
            (None, None) => return Err(validation_error("actionId or pipelineId is required")),
        };
        let input: ActionInput = input.try_into().map_err(crm_error)?;
        let db = database(ctx)?;
        let settings = settings(ctx)?;
        let txn = db.begin().await.map_err(internal_error)?;
        let outcome =
            service::edit_action(&SeaOrmStore::new(&txn), &settings.clock, target, input)
                .await;
        finish(txn, outcome).await.map(Into::into)
    }

    /// Saves pipeline fields and folds identical client/campaign pipelines together.
    #[instrument(name = "graphql.crm.editPipeline", skip_all)]
    async fn edit_pipeline(
        &self,
        ctx: &Context<'_>,
        input: EditPipelineInput,
    ) -> Result<EditPipelinePayload> {
        let db = database(ctx)?;
        let settings = settings(ctx)?;
        let input = EditPipeline {
            unique_id: input.unique_id,
            pipeline: input.pipeline.into(),
            followup: input.followup,
        };
        let txn = db.begin().await.map_err(internal_error)?;
        let outcome =
            service::edit_pipeline(&SeaOrmStore::new(&txn), &settings.clock, input).await;
        finish(txn, outcome).await.map(Into::into)
    }
}

fn database(ctx: &Context<'_>) -> Result<Arc<DbPool>> {
    ctx.data::<Arc<DbPool>>()
        .cloned()
        .map_err(|_| internal_error(anyhow::anyhow!("database not configured")))
}

fn settings<'a>(ctx: &Context<'a>) -> Result<&'a CrmSettings> {
    ctx.data::<CrmSettings>()
        .map_err(|_| internal_error(anyhow::anyhow!("crm settings not configured")))
}

async fn load_snapshot(ctx: &Context<'_>) -> Result<Snapshot> {
    let db = database(ctx)?;
    Snapshot::load(&SeaOrmStore::new(db.as_ref()))
        .await
        .map_err(crm_error)
}

/// Commits on success. On failure the transaction is rolled back so a
/// half-applied merge never becomes visible.
async fn finish<T>(txn: DatabaseTransaction, outcome: CrmResult<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            txn.commit().await.map_err(internal_error)?;
            Ok(value)
        }
        Err(err) => match txn.rollback().await {
            Ok(()) => Err(crm_error(rolled_back(err))),
            Err(rollback) => {
                error!(error = %rollback, "rollback failed");
                Err(crm_error(err))
            }
        },
    }
}

/// After a successful rollback none of a merge's journaled steps were kept,
/// so the failure is reported as the step error itself.
fn rolled_back(err: CrmError) -> CrmError {
    match err {
        CrmError::PartialMerge { completed, source } => {
            error!(steps = completed.len(), error = %source, "merge rolled back");
            *source
        }
        other => other,
    }
}

pub fn crm_error(err: CrmError) -> async_graphql::Error {
    error!(error = %err, "crm operation failed");
    let api = match err {
        CrmError::NotFound(what) => ApiError::NotFound(what),
        CrmError::Validation(message) => ApiError::Validation(message),
        err @ CrmError::Duplicate { .. } => ApiError::Duplicate(err.to_string()),
        err @ CrmError::PartialMerge { .. } => ApiError::ReloadRequired(err.to_string()),
        err @ CrmError::Db(_) => ApiError::internal(err.into()),
    };
    api.extend()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::{Request, Value};
    use chrono::{FixedOffset, TimeZone};
    use crm::clock::Clock;
    use migration::{Migrator, MigratorTrait};
    use platform_db::{DatabaseSettings, connect};
    use serde_json::json;

    async fn seeded_schema() -> SchemaType {
        let db = connect(&DatabaseSettings::new("sqlite::memory:"))
            .await
            .expect("connect sqlite");
        Migrator::up(&db, None).await.expect("migrate");
        crm::seed::seed_demo(&db).await.expect("seed");
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 2, 25, 10, 0, 0)
            .unwrap();
        let settings = CrmSettings {
            clock: Clock::fixed(now),
            ..CrmSettings::default()
        };
        build_schema(Arc::new(db), settings)
    }

    fn error_code(response: &async_graphql::Response) -> Option<Value> {
        response.errors.first().and_then(|err| {
            err.extensions
                .as_ref()
                .and_then(|map| map.get("code"))
                .cloned()
        })
    }

    #[tokio::test]
    async fn health_query_returns_ok() {
        let schema = Schema::build(QueryRoot, MutationRoot, EmptySubscription).finish();
        let response = schema.execute(Request::new("{ health { ok } }")).await;
        assert!(response.errors.is_empty());
        let body = response.data.into_json().unwrap();
        assert_eq!(body, json!({"health": {"ok": true}}));
    }

    #[test]
    fn sdl_exposes_crm_roots() {
        let sdl = schema_sdl();
        assert!(sdl.contains("type CrmQuery"));
        assert!(sdl.contains("type CrmMutation"));
        assert!(sdl.contains("enum Stage"));
    }

    #[tokio::test]
    async fn active_pipelines_and_owners() {
        let schema = seeded_schema().await;
        let response = schema
            .execute(Request::new(
                "{ crm { pipelines { uniqueId displayName contactPhoneDisplay } owners { name } } }",
            ))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let body = response.data.into_json().unwrap();
        assert_eq!(
            body["crm"]["pipelines"],
            json!([
                {"uniqueId": "P-1002", "displayName": "Blue Ocean", "contactPhoneDisplay": "010-1234-5678"},
                {"uniqueId": "P-1001", "displayName": "ABC Corp x Spring Launch", "contactPhoneDisplay": "010-1234-5678"},
            ])
        );
        assert_eq!(
            body["crm"]["owners"],
            json!([{"name": "Ara Kim"}, {"name": "Jongmin Lee"}, {"name": "Minho Park"}])
        );
    }

    #[tokio::test]
    async fn board_uses_the_configured_clock() {
        let schema = seeded_schema().await;
        let response = schema
            .execute(Request::new(
                "{ crm { board { period current { contacts closedWon } currentMeetingConversion currentBookingRate } } }",
            ))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let body = response.data.into_json().unwrap();
        assert_eq!(
            body["crm"]["board"],
            json!({
                "period": "2025-02",
                "current": {"contacts": 3, "closedWon": 1},
                "currentMeetingConversion": 33.3,
                "currentBookingRate": 100.0,
            })
        );
    }

    #[tokio::test]
    async fn duplicate_create_reports_code() {
        let schema = seeded_schema().await;
        let response = schema
            .execute(Request::new(
                r#"mutation { crm { createPipeline(input: {
                    pipeline: { clientName: "ABC Corp", campaign: "Spring Launch" },
                    action: { actionType: CALL }
                }) { uniqueId } } }"#,
            ))
            .await;
        assert_eq!(error_code(&response), Some(Value::from("DUPLICATE")));
    }

    #[tokio::test]
    async fn check_client_flags_duplicates() {
        let schema = seeded_schema().await;
        let response = schema
            .execute(Request::new(
                r#"{ crm { checkClient(clientName: "ABC Corp", campaign: "Spring Launch") {
                    status blocksSubmit uniqueIds } } }"#,
            ))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let body = response.data.into_json().unwrap();
        assert_eq!(
            body["crm"]["checkClient"],
            json!({"status": "DUPLICATE", "blocksSubmit": true, "uniqueIds": ["P-1001"]})
        );
    }

    #[tokio::test]
    async fn edit_pipeline_merges_into_oldest() {
        let schema = seeded_schema().await;
        let response = schema
            .execute(Request::new(
                r#"mutation { crm { editPipeline(input: {
                    uniqueId: "P-1003",
                    pipeline: { clientName: "ABC Corp", campaign: "Spring Launch", product: "display" }
                }) { survivorId absorbed merged } } }"#,
            ))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let body = response.data.into_json().unwrap();
        assert_eq!(
            body["crm"]["editPipeline"],
            json!({"survivorId": "P-1001", "absorbed": ["P-1003"], "merged": true})
        );

        let response = schema
            .execute(Request::new(
                r#"{ crm { pipeline(uniqueId: "P-1001") { actionCount } gone: pipeline(uniqueId: "P-1003") { uniqueId } } }"#,
            ))
            .await;
        let body = response.data.into_json().unwrap();
        assert_eq!(body["crm"]["pipeline"]["actionCount"], json!(3));
        assert_eq!(body["crm"]["gone"], json!(null));
    }

    #[test]
    fn rolled_back_merge_reports_the_failed_step() {
        let partial = CrmError::PartialMerge {
            completed: vec![crm::merge::MergeStep::DeletePipeline {
                unique_id: "P-2".into(),
            }],
            source: Box::new(CrmError::not_found("pipeline P-1")),
        };
        let err = crm_error(rolled_back(partial));
        assert_eq!(err.message, "pipeline P-1 not found");
        assert_eq!(
            err.extensions.as_ref().and_then(|map| map.get("code")).cloned(),
            Some(Value::from("NOT_FOUND"))
        );

        let plain = rolled_back(CrmError::validation("client name is required"));
        assert!(matches!(plain, CrmError::Validation(_)));
    }

    #[tokio::test]
    async fn oversized_budget_text_is_a_validation_error() {
        let schema = seeded_schema().await;
        let response = schema
            .execute(Request::new(
                r#"mutation { crm { recordAction(pipelineId: "P-1001",
                    input: { actionType: CALL, budget: "1,000,000,000,000,000" }) {
                    pipelineFollowup } } }"#,
            ))
            .await;
        assert_eq!(error_code(&response), Some(Value::from("VALIDATION")));
    }

    #[tokio::test]
    async fn edit_action_requires_a_target() {
        let schema = seeded_schema().await;
        let response = schema
            .execute(Request::new(
                "mutation { crm { editAction(input: { actionType: EMAIL }) { pipelineFollowup } } }",
            ))
            .await;
        assert_eq!(error_code(&response), Some(Value::from("VALIDATION")));
    }
}
