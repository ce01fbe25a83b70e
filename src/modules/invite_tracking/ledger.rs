use crate::db::entities::{guild_invite_settings, invite_ledger, inviter_counters};
use crate::services::cache::TtlCache;
use crate::Error;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use std::str::FromStr;
use std::time::Duration;

const COUNTS_CACHE_TTL: Duration = Duration::from_secs(15);

/// Per-inviter counts with the settings-adjusted display total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InviteCounts {
    pub regular: i32,
    pub fake: i32,
    pub left: i32,
    pub total: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum ResetKind {
    #[name = "All Invites"]
    All,
    #[name = "Regular Invites"]
    Regular,
    #[name = "Fake Invites"]
    Fake,
    #[name = "Left Invites"]
    Left,
}

impl FromStr for ResetKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ResetKind::All),
            "regular" => Ok(ResetKind::Regular),
            "fake" => Ok(ResetKind::Fake),
            "left" => Ok(ResetKind::Left),
            _ => Err(()),
        }
    }
}

/// Classify ledger rows per the counting rule: fake dominates, then left,
/// then regular. The three buckets always sum to the row count.
pub fn derive_counts(rows: &[invite_ledger::Model]) -> (i32, i32, i32) {
    let mut regular = 0;
    let mut fake = 0;
    let mut left = 0;
    for row in rows {
        if row.is_fake {
            fake += 1;
        } else if row.is_left {
            left += 1;
        } else {
            regular += 1;
        }
    }
    (regular, fake, left)
}

/// Display total: regular always counts, fake and left only when the guild
/// opted in.
pub fn apply_settings(
    (regular, fake, left): (i32, i32, i32),
    settings: &guild_invite_settings::Model,
) -> InviteCounts {
    let mut total = regular;
    if settings.count_fake_invites {
        total += fake;
    }
    if settings.count_left_invites {
        total += left;
    }
    InviteCounts {
        regular,
        fake,
        left,
        total,
    }
}

/// Durable join-attribution records and the per-inviter aggregates derived
/// from them. Counters are never incremented in place: every ledger write is
/// followed by a full recount for the touched inviter, so repeated or
/// out-of-order deliveries cannot double-count.
pub struct LedgerStore {
    db: DatabaseConnection,
    counts_cache: TtlCache<(i64, i64), (i32, i32, i32)>,
}

impl LedgerStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            counts_cache: TtlCache::new(COUNTS_CACHE_TTL),
        }
    }

    /// Upsert the ledger row for a join. A rejoin overwrites the inviter,
    /// refreshes the fake classification from the current account age, and
    /// clears `is_left`. Counters are recomputed for the new inviter, and for
    /// the previous inviter when the rejoin switched invites.
    pub async fn record_join(
        &self,
        guild_id: i64,
        user_id: i64,
        inviter_id: i64,
        is_fake: bool,
    ) -> Result<(), Error> {
        let previous = invite_ledger::Entity::find_by_id((guild_id, user_id))
            .one(&self.db)
            .await?;

        let row = invite_ledger::ActiveModel {
            guild_id: Set(guild_id),
            user_id: Set(user_id),
            inviter_id: Set(inviter_id),
            is_fake: Set(is_fake),
            is_left: Set(false),
            created_at: Set(Utc::now().into()),
        };
        invite_ledger::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    invite_ledger::Column::GuildId,
                    invite_ledger::Column::UserId,
                ])
                .update_columns([
                    invite_ledger::Column::InviterId,
                    invite_ledger::Column::IsFake,
                    invite_ledger::Column::IsLeft,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        self.recompute_counters(guild_id, inviter_id).await?;
        if let Some(previous) = previous {
            if previous.inviter_id != inviter_id {
                self.recompute_counters(guild_id, previous.inviter_id).await?;
            }
        }
        Ok(())
    }

    /// Mark the user's ledger row as left, if one exists. Returns the inviter
    /// whose counters were recomputed, or `None` when the user joined through
    /// an untracked path.
    pub async fn record_leave(&self, guild_id: i64, user_id: i64) -> Result<Option<i64>, Error> {
        let Some(row) = invite_ledger::Entity::find_by_id((guild_id, user_id))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let inviter_id = row.inviter_id;

        invite_ledger::Entity::update_many()
            .col_expr(invite_ledger::Column::IsLeft, Expr::value(true))
            .filter(invite_ledger::Column::GuildId.eq(guild_id))
            .filter(invite_ledger::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        self.recompute_counters(guild_id, inviter_id).await?;
        Ok(Some(inviter_id))
    }

    /// Recount the inviter's ledger rows and replace the counters row.
    /// Idempotent: repeated calls with an unchanged ledger store the same
    /// values.
    pub async fn recompute_counters(
        &self,
        guild_id: i64,
        inviter_id: i64,
    ) -> Result<(i32, i32, i32), Error> {
        let counts = recompute_counters_on(&self.db, guild_id, inviter_id).await?;
        self.counts_cache.invalidate(&(guild_id, inviter_id));
        Ok(counts)
    }

    /// Counters row (zeros when absent) combined with guild settings into a
    /// display total.
    pub async fn get_counts(
        &self,
        settings: &guild_invite_settings::Model,
        guild_id: i64,
        user_id: i64,
    ) -> Result<InviteCounts, Error> {
        let raw = match self.counts_cache.get(&(guild_id, user_id)) {
            Some(raw) => raw,
            None => {
                let row = inviter_counters::Entity::find_by_id((guild_id, user_id))
                    .one(&self.db)
                    .await?;
                let raw = row.map(|r| (r.regular, r.fake, r.left)).unwrap_or((0, 0, 0));
                self.counts_cache.insert((guild_id, user_id), raw);
                raw
            }
        };
        Ok(apply_settings(raw, settings))
    }

    /// Top inviters ordered by their settings-adjusted total.
    pub async fn get_leaderboard(
        &self,
        settings: &guild_invite_settings::Model,
        guild_id: i64,
        limit: usize,
    ) -> Result<Vec<(i64, InviteCounts)>, Error> {
        let rows = inviter_counters::Entity::find()
            .filter(inviter_counters::Column::GuildId.eq(guild_id))
            .all(&self.db)
            .await?;

        let mut board: Vec<(i64, InviteCounts)> = rows
            .into_iter()
            .map(|r| (r.user_id, apply_settings((r.regular, r.fake, r.left), settings)))
            .collect();
        board.sort_by(|a, b| b.1.total.cmp(&a.1.total).then(a.0.cmp(&b.0)));
        board.truncate(limit);
        Ok(board)
    }

    /// Reset ledger rows for one inviter or the whole guild.
    ///
    /// `All` deletes rows and zeroes counters. `Regular` reclassifies regular
    /// rows as fake so they stop counting, preserving history. `Fake` and
    /// `Left` delete only rows already in that state. The whole operation is
    /// one transaction; affected counters are recomputed before commit.
    pub async fn reset_invites(
        &self,
        guild_id: i64,
        inviter_id: Option<i64>,
        kind: ResetKind,
    ) -> Result<(), Error> {
        let txn = self.db.begin().await?;

        let affected: Vec<i64> = match inviter_id {
            Some(id) => vec![id],
            None => {
                invite_ledger::Entity::find()
                    .select_only()
                    .column(invite_ledger::Column::InviterId)
                    .distinct()
                    .filter(invite_ledger::Column::GuildId.eq(guild_id))
                    .into_tuple()
                    .all(&txn)
                    .await?
            }
        };

        match kind {
            ResetKind::All => {
                let mut delete_rows =
                    invite_ledger::Entity::delete_many().filter(invite_ledger::Column::GuildId.eq(guild_id));
                if let Some(id) = inviter_id {
                    delete_rows = delete_rows.filter(invite_ledger::Column::InviterId.eq(id));
                }
                delete_rows.exec(&txn).await?;

                let mut delete_counters = inviter_counters::Entity::delete_many()
                    .filter(inviter_counters::Column::GuildId.eq(guild_id));
                if let Some(id) = inviter_id {
                    delete_counters = delete_counters.filter(inviter_counters::Column::UserId.eq(id));
                }
                delete_counters.exec(&txn).await?;
            }
            ResetKind::Regular => {
                let mut update = invite_ledger::Entity::update_many()
                    .col_expr(invite_ledger::Column::IsFake, Expr::value(true))
                    .filter(invite_ledger::Column::GuildId.eq(guild_id))
                    .filter(invite_ledger::Column::IsFake.eq(false))
                    .filter(invite_ledger::Column::IsLeft.eq(false));
                if let Some(id) = inviter_id {
                    update = update.filter(invite_ledger::Column::InviterId.eq(id));
                }
                update.exec(&txn).await?;
            }
            ResetKind::Fake => {
                let mut delete = invite_ledger::Entity::delete_many()
                    .filter(invite_ledger::Column::GuildId.eq(guild_id))
                    .filter(invite_ledger::Column::IsFake.eq(true));
                if let Some(id) = inviter_id {
                    delete = delete.filter(invite_ledger::Column::InviterId.eq(id));
                }
                delete.exec(&txn).await?;
            }
            ResetKind::Left => {
                let mut delete = invite_ledger::Entity::delete_many()
                    .filter(invite_ledger::Column::GuildId.eq(guild_id))
                    .filter(invite_ledger::Column::IsLeft.eq(true))
                    .filter(invite_ledger::Column::IsFake.eq(false));
                if let Some(id) = inviter_id {
                    delete = delete.filter(invite_ledger::Column::InviterId.eq(id));
                }
                delete.exec(&txn).await?;
            }
        }

        if !matches!(kind, ResetKind::All) {
            for id in &affected {
                recompute_counters_on(&txn, guild_id, *id).await?;
            }
        }

        txn.commit().await?;

        match inviter_id {
            Some(id) => self.counts_cache.invalidate(&(guild_id, id)),
            None => self.counts_cache.invalidate_all(),
        }
        Ok(())
    }
}

async fn recompute_counters_on<C: ConnectionTrait>(
    db: &C,
    guild_id: i64,
    inviter_id: i64,
) -> Result<(i32, i32, i32), Error> {
    let rows = invite_ledger::Entity::find()
        .filter(invite_ledger::Column::GuildId.eq(guild_id))
        .filter(invite_ledger::Column::InviterId.eq(inviter_id))
        .all(db)
        .await?;

    let (regular, fake, left) = derive_counts(&rows);

    let model = inviter_counters::ActiveModel {
        guild_id: Set(guild_id),
        user_id: Set(inviter_id),
        regular: Set(regular),
        fake: Set(fake),
        left: Set(left),
        updated_at: Set(Utc::now().into()),
    };
    inviter_counters::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([
                inviter_counters::Column::GuildId,
                inviter_counters::Column::UserId,
            ])
            .update_columns([
                inviter_counters::Column::Regular,
                inviter_counters::Column::Fake,
                inviter_counters::Column::Left,
                inviter_counters::Column::UpdatedAt,
            ])
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok((regular, fake, left))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn row(user_id: i64, inviter_id: i64, is_fake: bool, is_left: bool) -> invite_ledger::Model {
        invite_ledger::Model {
            guild_id: 1,
            user_id,
            inviter_id,
            is_fake,
            is_left,
            created_at: Utc::now().into(),
        }
    }

    fn settings(count_fake: bool, count_left: bool) -> guild_invite_settings::Model {
        guild_invite_settings::Model {
            count_fake_invites: count_fake,
            count_left_invites: count_left,
            ..guild_invite_settings::Model::defaults(1)
        }
    }

    #[test]
    fn test_classification_buckets_sum_to_row_count() {
        let rows = vec![
            row(1, 9, false, false),
            row(2, 9, true, false),
            row(3, 9, true, true),
            row(4, 9, false, true),
            row(5, 9, false, false),
        ];

        let (regular, fake, left) = derive_counts(&rows);
        assert_eq!((regular, fake, left), (2, 2, 1));
        assert_eq!((regular + fake + left) as usize, rows.len());
    }

    #[test]
    fn test_fake_dominates_left() {
        let rows = vec![row(1, 9, true, true)];
        assert_eq!(derive_counts(&rows), (0, 1, 0));
    }

    #[test]
    fn test_leave_moves_regular_to_left() {
        let before = vec![row(1, 9, false, false)];
        let after = vec![row(1, 9, false, true)];

        assert_eq!(derive_counts(&before), (1, 0, 0));
        assert_eq!(derive_counts(&after), (0, 0, 1));
    }

    #[test]
    fn test_regular_reset_reclassifies_as_fake() {
        let before = vec![row(1, 9, false, false), row(2, 9, true, false)];
        // What a `Regular` reset leaves behind: former regular rows are fake.
        let after = vec![row(1, 9, true, false), row(2, 9, true, false)];

        assert_eq!(derive_counts(&before), (1, 1, 0));
        assert_eq!(derive_counts(&after), (0, 2, 0));
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let rows = vec![row(1, 9, false, false), row(2, 9, true, false)];
        assert_eq!(derive_counts(&rows), derive_counts(&rows));
    }

    #[test]
    fn test_display_total_honors_settings() {
        let raw = (5, 2, 3);

        assert_eq!(apply_settings(raw, &settings(false, true)).total, 8);
        assert_eq!(apply_settings(raw, &settings(true, false)).total, 7);
        assert_eq!(apply_settings(raw, &settings(true, true)).total, 10);
        assert_eq!(apply_settings(raw, &settings(false, false)).total, 5);
    }

    #[test]
    fn test_reset_kind_from_str() {
        assert_eq!("all".parse::<ResetKind>(), Ok(ResetKind::All));
        assert_eq!("Regular".parse::<ResetKind>(), Ok(ResetKind::Regular));
        assert_eq!("FAKE".parse::<ResetKind>(), Ok(ResetKind::Fake));
        assert_eq!("left".parse::<ResetKind>(), Ok(ResetKind::Left));
        assert!("everything".parse::<ResetKind>().is_err());
    }

    #[tokio::test]
    async fn test_recompute_replaces_counters_from_ledger() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![
                row(1, 9, false, false),
                row(2, 9, true, false),
                row(3, 9, false, true),
            ]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let counts = recompute_counters_on(&db, 1, 9).await.unwrap();
        assert_eq!(counts, (1, 1, 1));
    }

    #[tokio::test]
    async fn test_record_leave_is_noop_without_ledger_row() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<invite_ledger::Model>::new()])
            .into_connection();

        let store = LedgerStore::new(db);
        let result = store.record_leave(1, 42).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_get_counts_defaults_to_zero() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<inviter_counters::Model>::new()])
            .into_connection();

        let store = LedgerStore::new(db);
        let counts = store.get_counts(&settings(true, true), 1, 42).await.unwrap();
        assert_eq!(counts, InviteCounts::default());
    }
}
