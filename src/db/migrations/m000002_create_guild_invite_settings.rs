use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GuildInviteSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GuildInviteSettings::GuildId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GuildInviteSettings::CountFakeInvites)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(GuildInviteSettings::CountLeftInvites)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(GuildInviteSettings::EnableWelcome)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(GuildInviteSettings::WelcomeChannelId).big_integer())
                    .col(
                        ColumnDef::new(GuildInviteSettings::WelcomeMessage)
                            .text()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GuildInviteSettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GuildInviteSettings {
    Table,
    GuildId,
    CountFakeInvites,
    CountLeftInvites,
    EnableWelcome,
    WelcomeChannelId,
    WelcomeMessage,
}
