use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create invite_ledger table
        manager
            .create_table(
                Table::create()
                    .table(InviteLedger::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InviteLedger::GuildId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InviteLedger::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InviteLedger::InviterId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InviteLedger::IsFake)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(InviteLedger::IsLeft)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(InviteLedger::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(InviteLedger::GuildId)
                            .col(InviteLedger::UserId),
                    )
                    .to_owned(),
            )
            .await?;

        // Counter recomputation scans by (guild, inviter)
        manager
            .create_index(
                Index::create()
                    .name("idx-invite-ledger-guild-inviter")
                    .table(InviteLedger::Table)
                    .col(InviteLedger::GuildId)
                    .col(InviteLedger::InviterId)
                    .to_owned(),
            )
            .await?;

        // Create inviter_counters table
        manager
            .create_table(
                Table::create()
                    .table(InviterCounters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InviterCounters::GuildId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InviterCounters::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InviterCounters::Regular)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(InviterCounters::Fake)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(InviterCounters::Left)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(InviterCounters::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(InviterCounters::GuildId)
                            .col(InviterCounters::UserId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-inviter-counters-guild-regular")
                    .table(InviterCounters::Table)
                    .col(InviterCounters::GuildId)
                    .col((InviterCounters::Regular, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InviterCounters::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(InviteLedger::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum InviteLedger {
    Table,
    GuildId,
    UserId,
    InviterId,
    IsFake,
    IsLeft,
    CreatedAt,
}

#[derive(DeriveIden)]
enum InviterCounters {
    Table,
    GuildId,
    UserId,
    Regular,
    Fake,
    Left,
    UpdatedAt,
}
