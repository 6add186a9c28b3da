//! Write flows and the reads that back the pipeline forms.
//!
//! Every write recomputes the owning pipeline's follow-up flag from its
//! actions before returning.

use chrono::NaiveDate;
use entity::action::{self, ActionType, Stage};
use entity::{manager, pipeline};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::clock::Clock;
use crate::error::{CrmError, CrmResult};
use crate::merge::{IdentityKey, MergePlan, MergeStep, resolve_merge};
use crate::store::{ActionFields, CrmStore, PipelinePatch};
use crate::validation::{similar_client_names, similar_clients_message};

/// Pipeline form fields as entered. Empty strings mean "not set".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineInput {
    pub product: String,
    pub owner_name: String,
    pub client_name: String,
    pub campaign: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionInput {
    pub action_type: ActionType,
    pub stage: Option<Stage>,
    pub budget: i64,
    pub memo: String,
    pub followup: bool,
    /// Defaults to today.
    pub action_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPipeline {
    pub pipeline: PipelineInput,
    pub action: ActionInput,
    pub followup: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditPipeline {
    pub unique_id: String,
    pub pipeline: PipelineInput,
    /// Ignored: the flag is always derived from the actions.
    pub followup: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionTarget {
    Action(i32),
    /// Most recently created action of this pipeline.
    LatestOf(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPipeline {
    pub unique_id: String,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: action::Model,
    pub pipeline_followup: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOutcome {
    pub survivor_id: String,
    pub absorbed: Vec<String>,
    pub merged: bool,
    pub followup: bool,
}

/// Largest budget a single action may carry (just under 10^15).
pub const MAX_BUDGET: i64 = 999_999_999_999_999;

/// Parses a budget typed with thousands separators.
///
/// Leading digits are read and the rest is ignored, so `"1.5"` is 1 and
/// `"12abc"` is 12. Text with no leading digits is zero. Amounts above
/// [`MAX_BUDGET`] are rejected.
pub fn parse_budget(raw: &str) -> CrmResult<i64> {
    let cleaned = raw.trim().replace(',', "");
    let (negative, rest) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Ok(0);
    }
    let out_of_range = || CrmError::validation(format!("budget is out of range: {}", raw.trim()));
    let value: i64 = digits.parse().map_err(|_| out_of_range())?;
    if value > MAX_BUDGET {
        return Err(out_of_range());
    }
    Ok(if negative { -value } else { value })
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn validate_action(input: &ActionInput) -> CrmResult<()> {
    if input.budget < 0 {
        return Err(CrmError::validation("budget must not be negative"));
    }
    if input.budget > MAX_BUDGET {
        return Err(CrmError::validation(format!(
            "budget must not exceed {MAX_BUDGET}"
        )));
    }
    Ok(())
}

fn action_fields(input: ActionInput, followup: bool, today: NaiveDate) -> ActionFields {
    ActionFields {
        action_type: input.action_type,
        stage: input.stage,
        budget: input.budget,
        memo: non_empty(&input.memo),
        action_followup: followup,
        action_date: input.action_date.unwrap_or(today),
    }
}

/// Maps an owner name to a manager id. Blank means unassigned.
pub async fn resolve_manager<S>(store: &S, owner_name: &str) -> CrmResult<Option<i32>>
where
    S: CrmStore + ?Sized,
{
    let owner_name = owner_name.trim();
    if owner_name.is_empty() {
        return Ok(None);
    }
    match store.manager_by_name(owner_name).await? {
        Some(manager) => Ok(Some(manager.id)),
        None => Err(CrmError::validation(format!("unknown owner: {owner_name}"))),
    }
}

/// Rewrites a pipeline's follow-up flag as the OR of its actions' flags.
pub async fn recompute_followup<S>(store: &S, pipeline_id: &str) -> CrmResult<bool>
where
    S: CrmStore + ?Sized,
{
    let followup = store
        .actions_for(pipeline_id)
        .await?
        .iter()
        .any(|action| action.action_followup);
    store.set_pipeline_followup(pipeline_id, followup).await?;
    Ok(followup)
}

#[instrument(name = "crm.createPipeline", skip_all, fields(client = %input.pipeline.client_name))]
pub async fn create_pipeline<S>(
    store: &S,
    clock: &Clock,
    input: NewPipeline,
) -> CrmResult<CreatedPipeline>
where
    S: CrmStore + ?Sized,
{
    let NewPipeline {
        pipeline: fields,
        action: action_input,
        followup: form_followup,
    } = input;

    let client_name = fields.client_name.trim().to_owned();
    if client_name.is_empty() {
        return Err(CrmError::validation("client name is required"));
    }
    validate_action(&action_input)?;
    let manager_id = resolve_manager(store, &fields.owner_name).await?;
    let campaign = non_empty(&fields.campaign);

    let existing = store.pipelines().await?;
    let key = IdentityKey::new(&client_name, campaign.as_deref());
    if existing.iter().any(|p| IdentityKey::of(p) == key) {
        return Err(CrmError::Duplicate {
            client_name,
            campaign,
        });
    }
    let warnings = similar_clients_message(&similar_client_names(
        existing.iter().map(|p| p.client_name.as_str()),
        &client_name,
    ))
    .into_iter()
    .collect();

    let now = clock.now();
    let unique_id = next_unique_id(store, now.timestamp_millis()).await?;
    let action_followup = action_input.followup || action_input.stage == Some(Stage::Propose);

    store
        .insert_pipeline(pipeline::Model {
            unique_id: unique_id.clone(),
            product: fields.product.trim().to_owned(),
            client_name,
            campaign,
            manager_id,
            contact_name: non_empty(&fields.contact_name),
            contact_phone: non_empty(&fields.contact_phone),
            contact_email: non_empty(&fields.contact_email),
            pipeline_followup: form_followup || action_followup,
            created_at: now,
            updated_at: now,
        })
        .await?;
    store
        .insert_action(
            &unique_id,
            action_fields(action_input, action_followup, clock.today()),
            now,
        )
        .await?;
    recompute_followup(store, &unique_id).await?;

    info!(unique_id = %unique_id, "pipeline created");
    Ok(CreatedPipeline {
        unique_id,
        warnings,
    })
}

async fn next_unique_id<S>(store: &S, mut millis: i64) -> CrmResult<String>
where
    S: CrmStore + ?Sized,
{
    loop {
        let candidate = format!("P-{millis}");
        if store.pipeline(&candidate).await?.is_none() {
            return Ok(candidate);
        }
        millis += 1;
    }
}

#[instrument(name = "crm.recordAction", skip_all, fields(pipeline_id = %pipeline_id))]
pub async fn record_action<S>(
    store: &S,
    clock: &Clock,
    pipeline_id: &str,
    input: ActionInput,
) -> CrmResult<ActionOutcome>
where
    S: CrmStore + ?Sized,
{
    let pipeline_id = pipeline_id.trim();
    if pipeline_id.is_empty() {
        return Err(CrmError::validation("choose a pipeline"));
    }
    validate_action(&input)?;
    if store.pipeline(pipeline_id).await?.is_none() {
        return Err(CrmError::not_found(format!("pipeline {pipeline_id}")));
    }

    let followup = input.followup || input.stage == Some(Stage::Propose);
    let action = store
        .insert_action(
            pipeline_id,
            action_fields(input, followup, clock.today()),
            clock.now(),
        )
        .await?;
    let pipeline_followup = recompute_followup(store, pipeline_id).await?;

    info!(action_id = action.id, "action recorded");
    Ok(ActionOutcome {
        action,
        pipeline_followup,
    })
}

#[instrument(name = "crm.editAction", skip_all)]
pub async fn edit_action<S>(
    store: &S,
    clock: &Clock,
    target: ActionTarget,
    input: ActionInput,
) -> CrmResult<ActionOutcome>
where
    S: CrmStore + ?Sized,
{
    validate_action(&input)?;
    let existing = match &target {
        ActionTarget::Action(id) => store.action(*id).await?,
        ActionTarget::LatestOf(pipeline_id) => store.latest_action(pipeline_id).await?,
    }
    .ok_or_else(|| CrmError::not_found("action to edit"))?;

    let followup = input.followup;
    let action = store
        .update_action(
            existing.id,
            action_fields(input, followup, clock.today()),
            clock.now(),
        )
        .await?;
    let pipeline_followup = recompute_followup(store, &action.pipeline_id).await?;

    info!(action_id = action.id, pipeline_id = %action.pipeline_id, "action updated");
    Ok(ActionOutcome {
        action,
        pipeline_followup,
    })
}

/// Saves a pipeline edit, folding it into (or absorbing) any pipeline that
/// already carries the new identity.
///
/// Each mutation is journaled. When a step fails after others succeeded,
/// the error is [`CrmError::PartialMerge`] listing what was applied.
#[instrument(name = "crm.editPipeline", skip_all, fields(unique_id = %input.unique_id))]
pub async fn edit_pipeline<S>(
    store: &S,
    clock: &Clock,
    input: EditPipeline,
) -> CrmResult<EditOutcome>
where
    S: CrmStore + ?Sized,
{
    let fields = input.pipeline;
    let client_name = fields.client_name.trim().to_owned();
    if client_name.is_empty() {
        return Err(CrmError::validation("client name is required"));
    }
    let manager_id = resolve_manager(store, &fields.owner_name).await?;
    if store.pipeline(&input.unique_id).await?.is_none() {
        return Err(CrmError::not_found(format!("pipeline {}", input.unique_id)));
    }

    let campaign = non_empty(&fields.campaign);
    let all = store.pipelines().await?;
    let plan = resolve_merge(&input.unique_id, &client_name, campaign.as_deref(), &all)?;
    if plan.is_merge() {
        info!(
            survivor = %plan.survivor_id,
            absorbed = ?plan.absorbed,
            "merging pipelines"
        );
    }

    let patch = PipelinePatch {
        product: fields.product.trim().to_owned(),
        client_name,
        campaign,
        manager_id,
        contact_name: non_empty(&fields.contact_name),
        contact_phone: non_empty(&fields.contact_phone),
        contact_email: non_empty(&fields.contact_email),
    };

    let mut journal = Vec::new();
    match apply_plan(store, clock, &plan, patch, &mut journal).await {
        Ok(followup) => Ok(EditOutcome {
            merged: plan.is_merge(),
            survivor_id: plan.survivor_id,
            absorbed: plan.absorbed,
            followup,
        }),
        Err(err) if journal.is_empty() => {
            error!(error = %err, "pipeline edit failed");
            Err(err)
        }
        Err(err) => {
            error!(error = %err, completed = ?journal, "pipeline edit stopped part-way");
            Err(CrmError::PartialMerge {
                completed: journal,
                source: Box::new(err),
            })
        }
    }
}

async fn apply_plan<S>(
    store: &S,
    clock: &Clock,
    plan: &MergePlan,
    patch: PipelinePatch,
    journal: &mut Vec<MergeStep>,
) -> CrmResult<bool>
where
    S: CrmStore + ?Sized,
{
    let survivor = plan.survivor_id.as_str();
    for absorbed in &plan.absorbed {
        let moved = store.reassign_actions(absorbed, survivor).await?;
        journal.push(MergeStep::ReassignActions {
            from: absorbed.clone(),
            to: survivor.to_owned(),
            moved,
        });
        store.delete_pipeline(absorbed).await?;
        journal.push(MergeStep::DeletePipeline {
            unique_id: absorbed.clone(),
        });
    }

    store.update_pipeline(survivor, patch, clock.now()).await?;
    journal.push(MergeStep::UpdateSurvivor {
        unique_id: survivor.to_owned(),
    });

    let followup = recompute_followup(store, survivor).await?;
    journal.push(MergeStep::RecomputeFollowup {
        unique_id: survivor.to_owned(),
        followup,
    });
    Ok(followup)
}

/// Older actions of a pipeline for the history accordion: newest first,
/// without the latest one (which the list row already shows).
pub async fn pipeline_history<S>(store: &S, unique_id: &str) -> CrmResult<Vec<action::Model>>
where
    S: CrmStore + ?Sized,
{
    fn effective_date(action: &action::Model) -> NaiveDate {
        action
            .action_date
            .unwrap_or_else(|| action.created_at.date_naive())
    }

    let mut actions = store.actions_for(unique_id).await?;
    actions.sort_by(|a, b| {
        effective_date(b)
            .cmp(&effective_date(a))
            .then(b.created_at.cmp(&a.created_at))
            .then(b.id.cmp(&a.id))
    });
    if !actions.is_empty() {
        actions.remove(0);
    }
    Ok(actions)
}

/// Managers that can own a pipeline, sorted by name.
pub async fn owner_options<S>(
    store: &S,
    team: &str,
    excluded_ids: &[i32],
) -> CrmResult<Vec<manager::Model>>
where
    S: CrmStore + ?Sized,
{
    Ok(store
        .managers()
        .await?
        .into_iter()
        .filter(|m| m.manager_team.as_deref() == Some(team))
        .filter(|m| !excluded_ids.contains(&m.id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_accepts_separators() {
        assert_eq!(parse_budget("1,200,000").unwrap(), 1_200_000);
        assert_eq!(parse_budget(" 350 ").unwrap(), 350);
        assert_eq!(parse_budget("abc").unwrap(), 0);
        assert_eq!(parse_budget("").unwrap(), 0);
    }

    #[test]
    fn budget_reads_leading_digits() {
        assert_eq!(parse_budget("1.5").unwrap(), 1);
        assert_eq!(parse_budget("12abc").unwrap(), 12);
        assert_eq!(parse_budget("-40").unwrap(), -40);
        assert_eq!(parse_budget("-").unwrap(), 0);
    }

    #[test]
    fn oversized_budgets_are_rejected() {
        assert_eq!(parse_budget("999,999,999,999,999").unwrap(), MAX_BUDGET);
        for raw in ["1,000,000,000,000,000", "99999999999999999999999"] {
            let err = parse_budget(raw).unwrap_err();
            assert!(matches!(err, CrmError::Validation(_)), "{raw}: {err:?}");
        }

        let mut input = ActionInput {
            action_type: ActionType::Call,
            stage: None,
            budget: i64::MAX,
            memo: String::new(),
            followup: false,
            action_date: None,
        };
        assert!(matches!(validate_action(&input), Err(CrmError::Validation(_))));
        input.budget = MAX_BUDGET;
        assert!(validate_action(&input).is_ok());
    }

    #[test]
    fn blank_strings_are_unset() {
        assert_eq!(non_empty("  "), None);
        assert_eq!(non_empty(" ABC "), Some("ABC".to_owned()));
    }
}
