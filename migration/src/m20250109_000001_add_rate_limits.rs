use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Fixed-window counters, one row per limiter key
        manager
            .create_table(
                Table::create()
                    .table(OauthRateLimits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OauthRateLimits::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OauthRateLimits::Key)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OauthRateLimits::Count)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OauthRateLimits::ResetAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Create index on reset_at for efficient purging of stale windows
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_rate_limits_reset_at")
                    .table(OauthRateLimits::Table)
                    .col(OauthRateLimits::ResetAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OauthRateLimits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OauthRateLimits {
    Table,
    Id,
    Key,
    Count,
    ResetAt,
}
