use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

fn id_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Timestamp columns are bigint Unix milliseconds

        // Referenced by user_id columns; owned by the account service, not by this crate
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(id_col(Users::Id))
                    .col(
                        ColumnDef::new(Users::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::Name).string())
                    .col(ColumnDef::new(Users::CreatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        // Create oauth_clients table
        manager
            .create_table(
                Table::create()
                    .table(OauthClients::Table)
                    .if_not_exists()
                    .col(id_col(OauthClients::Id))
                    .col(
                        ColumnDef::new(OauthClients::ClientId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OauthClients::ClientSecretHash).string())
                    .col(ColumnDef::new(OauthClients::Name).string().not_null())
                    .col(ColumnDef::new(OauthClients::RedirectUris).text().not_null())
                    .col(ColumnDef::new(OauthClients::GrantTypes).text().not_null())
                    .col(ColumnDef::new(OauthClients::Scopes).text().not_null())
                    .col(
                        ColumnDef::new(OauthClients::IsConfidential)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(OauthClients::OwnerId).string().not_null())
                    .col(
                        ColumnDef::new(OauthClients::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OauthClients::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthClients::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_clients_owner_id")
                    .table(OauthClients::Table)
                    .col(OauthClients::OwnerId)
                    .to_owned(),
            )
            .await?;

        // Create oauth_tokens table
        manager
            .create_table(
                Table::create()
                    .table(OauthTokens::Table)
                    .if_not_exists()
                    .col(id_col(OauthTokens::Id))
                    .col(
                        ColumnDef::new(OauthTokens::Token)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OauthTokens::TokenType).string().not_null())
                    .col(ColumnDef::new(OauthTokens::ClientId).string().not_null())
                    .col(ColumnDef::new(OauthTokens::UserId).string())
                    .col(ColumnDef::new(OauthTokens::Scopes).text().not_null())
                    .col(
                        ColumnDef::new(OauthTokens::ExpiresAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthTokens::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthTokens::IsRevoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, col) in [
            ("idx_oauth_tokens_client_id", OauthTokens::ClientId),
            ("idx_oauth_tokens_user_id", OauthTokens::UserId),
            ("idx_oauth_tokens_expires_at", OauthTokens::ExpiresAt),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(OauthTokens::Table)
                        .col(col)
                        .to_owned(),
                )
                .await?;
        }

        // Create oauth_auth_codes table
        manager
            .create_table(
                Table::create()
                    .table(OauthAuthCodes::Table)
                    .if_not_exists()
                    .col(id_col(OauthAuthCodes::Id))
                    .col(
                        ColumnDef::new(OauthAuthCodes::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OauthAuthCodes::ClientId).string().not_null())
                    .col(ColumnDef::new(OauthAuthCodes::UserId).string().not_null())
                    .col(
                        ColumnDef::new(OauthAuthCodes::RedirectUri)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OauthAuthCodes::Scopes).text().not_null())
                    .col(ColumnDef::new(OauthAuthCodes::CodeChallenge).string())
                    .col(ColumnDef::new(OauthAuthCodes::CodeChallengeMethod).string())
                    .col(
                        ColumnDef::new(OauthAuthCodes::ExpiresAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthCodes::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthCodes::Consumed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_auth_codes_expires_at")
                    .table(OauthAuthCodes::Table)
                    .col(OauthAuthCodes::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_auth_codes_client_id")
                    .table(OauthAuthCodes::Table)
                    .col(OauthAuthCodes::ClientId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OauthAuthCodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OauthTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OauthClients::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OauthClients {
    Table,
    Id,
    ClientId,
    ClientSecretHash,
    Name,
    RedirectUris,
    GrantTypes,
    Scopes,
    IsConfidential,
    OwnerId,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OauthTokens {
    Table,
    Id,
    Token,
    TokenType,
    ClientId,
    UserId,
    Scopes,
    ExpiresAt,
    CreatedAt,
    IsRevoked,
}

#[derive(DeriveIden)]
enum OauthAuthCodes {
    Table,
    Id,
    Code,
    ClientId,
    UserId,
    RedirectUri,
    Scopes,
    CodeChallenge,
    CodeChallengeMethod,
    ExpiresAt,
    CreatedAt,
    Consumed,
}
