use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create oauth_consents table
        manager
            .create_table(
                Table::create()
                    .table(OauthConsents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OauthConsents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OauthConsents::UserId).string().not_null())
                    .col(ColumnDef::new(OauthConsents::ClientId).string().not_null())
                    .col(ColumnDef::new(OauthConsents::Scopes).text().not_null())
                    .col(
                        ColumnDef::new(OauthConsents::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthConsents::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One consent row per (user_id, client_id); upserts conflict on this index
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_consents_user_client")
                    .table(OauthConsents::Table)
                    .col(OauthConsents::UserId)
                    .col(OauthConsents::ClientId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create index on client_id for per-client audits
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_consents_client_id")
                    .table(OauthConsents::Table)
                    .col(OauthConsents::ClientId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OauthConsents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OauthConsents {
    Table,
    Id,
    UserId,
    ClientId,
    Scopes,
    CreatedAt,
    UpdatedAt,
}
