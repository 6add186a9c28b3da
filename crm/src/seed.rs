//! Demo data for local runs and tests.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use entity::action::{self, ActionType, Stage};
use entity::{manager, pipeline};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr};

#[derive(Clone, Debug)]
pub struct SeededCrm {
    pub managers: Vec<manager::Model>,
    pub pipelines: Vec<pipeline::Model>,
    pub actions: Vec<action::Model>,
}

impl SeededCrm {
    pub fn pipeline(&self, client_name: &str) -> Option<&pipeline::Model> {
        self.pipelines.iter().find(|p| p.client_name == client_name)
    }
}

struct SeedAction {
    pipeline_id: &'static str,
    action_type: ActionType,
    stage: Option<Stage>,
    budget: i64,
    memo: Option<&'static str>,
    followup: bool,
    on: (i32, u32, u32),
}

fn at(year: i32, month: u32, day: u32) -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0)
        .single()
        .unwrap_or_default()
        .fixed_offset()
}

/// Inserts managers, three pipelines and their January/February 2025
/// actions. Expects empty tables.
pub async fn seed_demo<C>(db: &C) -> Result<SeededCrm, DbErr>
where
    C: ConnectionTrait,
{
    let mut managers = Vec::new();
    for (id, name, team) in [
        (1, "Ara Kim", "ads"),
        (2, "Jongmin Lee", "ads"),
        (3, "Minho Park", "ads"),
        (4, "Sujin Choi", "brand"),
        (98, "Ops Bot", "ads"),
        (99, "QA Account", "ads"),
    ] {
        let model = manager::ActiveModel {
            id: Set(id),
            manager_name: Set(name.into()),
            manager_team: Set(Some(team.into())),
        }
        .insert(db)
        .await?;
        managers.push(model);
    }

    let mut pipelines = Vec::new();
    for (unique_id, client, campaign, manager_id, followup, day) in [
        ("P-1001", "ABC Corp", Some("Spring Launch"), 2, false, 1),
        ("P-1002", "Blue Ocean", None, 1, true, 2),
        ("P-1003", "Cosmo Foods", Some("Summer"), 3, false, 3),
    ] {
        let created = at(2025, 1, day);
        let model = pipeline::ActiveModel {
            unique_id: Set(unique_id.into()),
            product: Set("display".into()),
            client_name: Set(client.into()),
            campaign: Set(campaign.map(str::to_owned)),
            manager_id: Set(Some(manager_id)),
            contact_name: Set(Some(format!("{client} Marketing"))),
            contact_phone: Set(Some("01012345678".into())),
            contact_email: Set(None),
            pipeline_followup: Set(followup),
            created_at: Set(created),
            updated_at: Set(created),
        }
        .insert(db)
        .await?;
        pipelines.push(model);
    }

    let seed_actions = [
        SeedAction {
            pipeline_id: "P-1001",
            action_type: ActionType::Call,
            stage: Some(Stage::Contact),
            budget: 0,
            memo: None,
            followup: false,
            on: (2025, 1, 5),
        },
        SeedAction {
            pipeline_id: "P-1001",
            action_type: ActionType::Meeting,
            stage: Some(Stage::Lead),
            budget: 5_000_000,
            memo: Some("Kick-off meeting"),
            followup: false,
            on: (2025, 1, 12),
        },
        SeedAction {
            pipeline_id: "P-1002",
            action_type: ActionType::Email,
            stage: Some(Stage::Contact),
            budget: 0,
            memo: None,
            followup: false,
            on: (2025, 2, 3),
        },
        SeedAction {
            pipeline_id: "P-1002",
            action_type: ActionType::Call,
            stage: Some(Stage::Propose),
            budget: 3_000_000,
            memo: Some("Proposal sent"),
            followup: true,
            on: (2025, 2, 10),
        },
        SeedAction {
            pipeline_id: "P-1002",
            action_type: ActionType::Meeting,
            stage: Some(Stage::ClosedWon),
            budget: 3_000_000,
            memo: Some("Signed"),
            followup: false,
            on: (2025, 2, 20),
        },
        SeedAction {
            pipeline_id: "P-1003",
            action_type: ActionType::Email,
            stage: Some(Stage::Contact),
            budget: 0,
            memo: Some("Intro deck sent"),
            followup: false,
            on: (2025, 2, 14),
        },
    ];

    let mut actions = Vec::new();
    for seed in seed_actions {
        let (year, month, day) = seed.on;
        let created = at(year, month, day);
        let model = action::ActiveModel {
            id: NotSet,
            pipeline_id: Set(seed.pipeline_id.into()),
            action_type: Set(seed.action_type),
            stage: Set(seed.stage),
            budget: Set(seed.budget),
            memo: Set(seed.memo.map(str::to_owned)),
            action_followup: Set(seed.followup),
            action_date: Set(NaiveDate::from_ymd_opt(year, month, day)),
            created_at: Set(created),
            updated_at: Set(created),
        }
        .insert(db)
        .await?;
        actions.push(model);
    }

    Ok(SeededCrm {
        managers,
        pipelines,
        actions,
    })
}
