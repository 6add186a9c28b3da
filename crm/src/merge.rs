//! Identity merge resolution.
//!
//! A pipeline's identity is its (client name, campaign) pair. When an edit
//! makes two pipelines share an identity, the oldest one survives and the
//! rest are folded into it.

use entity::pipeline;
use serde::Serialize;

use crate::error::{CrmError, CrmResult};

/// Normalized (client name, campaign) pair. Both parts are trimmed and a
/// missing campaign is the empty string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    client_name: String,
    campaign: String,
}

impl IdentityKey {
    pub fn new(client_name: &str, campaign: Option<&str>) -> Self {
        Self {
            client_name: client_name.trim().to_owned(),
            campaign: campaign.unwrap_or_default().trim().to_owned(),
        }
    }

    pub fn of(model: &pipeline::Model) -> Self {
        Self::new(&model.client_name, model.campaign.as_deref())
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn campaign(&self) -> &str {
        &self.campaign
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePlan {
    pub survivor_id: String,
    /// Pipelines to fold into the survivor, in the order they are processed.
    pub absorbed: Vec<String>,
}

impl MergePlan {
    pub fn is_merge(&self) -> bool {
        !self.absorbed.is_empty()
    }
}

/// One completed mutation of a merge, kept so a failure can report how far
/// the sequence got.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum MergeStep {
    ReassignActions { from: String, to: String, moved: u64 },
    DeletePipeline { unique_id: String },
    UpdateSurvivor { unique_id: String },
    RecomputeFollowup { unique_id: String, followup: bool },
}

/// Decides which pipeline survives when `edited_id` takes the identity
/// (`client_name`, `campaign`).
///
/// The earliest `created_at` wins; on a tie the edited pipeline is preferred,
/// then the matches in input order.
pub fn resolve_merge(
    edited_id: &str,
    client_name: &str,
    campaign: Option<&str>,
    pipelines: &[pipeline::Model],
) -> CrmResult<MergePlan> {
    let edited = pipelines
        .iter()
        .find(|pipeline| pipeline.unique_id == edited_id)
        .ok_or_else(|| CrmError::not_found(format!("pipeline {edited_id}")))?;

    let key = IdentityKey::new(client_name, campaign);
    let matches: Vec<&pipeline::Model> = pipelines
        .iter()
        .filter(|pipeline| pipeline.unique_id != edited_id && IdentityKey::of(pipeline) == key)
        .collect();

    let survivor = matches.iter().fold(edited, |oldest, &candidate| {
        if candidate.created_at < oldest.created_at {
            candidate
        } else {
            oldest
        }
    });

    let mut absorbed: Vec<String> = matches
        .iter()
        .filter(|candidate| candidate.unique_id != survivor.unique_id)
        .map(|candidate| candidate.unique_id.clone())
        .collect();
    if survivor.unique_id != edited.unique_id {
        absorbed.push(edited.unique_id.clone());
    }

    Ok(MergePlan {
        survivor_id: survivor.unique_id.clone(),
        absorbed,
    })
}
