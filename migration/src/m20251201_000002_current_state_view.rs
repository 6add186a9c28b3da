use sea_orm_migration::prelude::*;

// Plain SQL shared by Postgres and SQLite. The latest action is picked by
// action_date (missing dates last on both backends), then created_at, then id.
const UP_SQL: &str = r#"
CREATE VIEW crm_pipeline_current_state AS
SELECT
    p.unique_id,
    p.client_name,
    p.campaign,
    p.product,
    m.manager_name,
    p.contact_name,
    p.contact_phone,
    p.contact_email,
    (SELECT COUNT(*) FROM crm_client_actions c WHERE c.pipeline_id = p.unique_id) AS action_count,
    la.action_date AS last_date,
    la.action_type AS last_action_type,
    la.stage AS current_stage,
    la.budget AS current_budget,
    la.memo AS last_memo,
    p.created_at
FROM crm_client_pipeline p
LEFT JOIN managers m ON m.id = p.manager_id
LEFT JOIN crm_client_actions la ON la.id = (
    SELECT a.id
    FROM crm_client_actions a
    WHERE a.pipeline_id = p.unique_id
    ORDER BY (a.action_date IS NULL), a.action_date DESC, a.created_at DESC, a.id DESC
    LIMIT 1
)
"#;

const DOWN_SQL: &str = "DROP VIEW IF EXISTS crm_pipeline_current_state";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(UP_SQL)
            .await
            .map(|_| ())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await
            .map(|_| ())
    }
}
