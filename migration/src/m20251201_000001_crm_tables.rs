use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Managers {
    Table,
    Id,
    ManagerName,
    ManagerTeam,
}

#[derive(DeriveIden)]
enum CrmClientPipeline {
    Table,
    UniqueId,
    Product,
    ClientName,
    Campaign,
    ManagerId,
    ContactName,
    ContactPhone,
    ContactEmail,
    PipelineFollowup,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CrmClientActions {
    Table,
    Id,
    PipelineId,
    ActionType,
    Stage,
    Budget,
    Memo,
    ActionFollowup,
    ActionDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Managers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Managers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Managers::ManagerName).string_len(128).not_null())
                    .col(ColumnDef::new(Managers::ManagerTeam).string_len(64))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_managers_name")
                    .table(Managers::Table)
                    .col(Managers::ManagerName)
                    .to_owned(),
            )
            .await?;

        // No unique key on (client_name, campaign): identity is kept unique by
        // the merge and duplicate checks in the application.
        manager
            .create_table(
                Table::create()
                    .table(CrmClientPipeline::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CrmClientPipeline::UniqueId)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CrmClientPipeline::Product).string_len(64).not_null())
                    .col(
                        ColumnDef::new(CrmClientPipeline::ClientName)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CrmClientPipeline::Campaign).string_len(256))
                    .col(ColumnDef::new(CrmClientPipeline::ManagerId).integer())
                    .col(ColumnDef::new(CrmClientPipeline::ContactName).string_len(128))
                    .col(ColumnDef::new(CrmClientPipeline::ContactPhone).string_len(64))
                    .col(ColumnDef::new(CrmClientPipeline::ContactEmail).string_len(256))
                    .col(
                        ColumnDef::new(CrmClientPipeline::PipelineFollowup)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(CrmClientPipeline::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CrmClientPipeline::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pipeline_manager")
                            .from(CrmClientPipeline::Table, CrmClientPipeline::ManagerId)
                            .to(Managers::Table, Managers::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_pipeline_identity")
                    .table(CrmClientPipeline::Table)
                    .col(CrmClientPipeline::ClientName)
                    .col(CrmClientPipeline::Campaign)
                    .to_owned(),
            )
            .await?;

        // Actions are re-parented during merges, so pipeline_id carries no
        // cascading foreign key.
        manager
            .create_table(
                Table::create()
                    .table(CrmClientActions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CrmClientActions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CrmClientActions::PipelineId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CrmClientActions::ActionType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CrmClientActions::Stage).string_len(16))
                    .col(
                        ColumnDef::new(CrmClientActions::Budget)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(CrmClientActions::Memo).text())
                    .col(
                        ColumnDef::new(CrmClientActions::ActionFollowup)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(CrmClientActions::ActionDate).date())
                    .col(
                        ColumnDef::new(CrmClientActions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CrmClientActions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_actions_pipeline_date")
                    .table(CrmClientActions::Table)
                    .col(CrmClientActions::PipelineId)
                    .col(CrmClientActions::ActionDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CrmClientActions::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CrmClientPipeline::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Managers::Table).if_exists().to_owned())
            .await
    }
}
