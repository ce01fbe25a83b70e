use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// What the diff needs to know about one live invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub code: String,
    pub uses: u64,
    pub inviter_id: Option<u64>,
    pub created_at: i64,
}

impl SnapshotEntry {
    pub fn from_invite(invite: &serenity::RichInvite) -> Self {
        Self {
            code: invite.code.to_string(),
            uses: invite.uses,
            inviter_id: invite.inviter.as_ref().map(|u| u.id.get()),
            created_at: invite.created_at.unix_timestamp(),
        }
    }

    pub fn from_create_event(event: &serenity::InviteCreateEvent) -> Self {
        Self {
            code: event.code.to_string(),
            uses: event.uses,
            inviter_id: event.inviter.as_ref().map(|u| u.id.get()),
            created_at: event.created_at.unix_timestamp(),
        }
    }
}

/// In-memory mirror of each guild's live invite list, keyed by invite code.
///
/// Never persisted: rebuilt from the platform at startup, patched by
/// invite-create/delete events, and replaced wholesale after every diff
/// resolution. A guild with no entry here has never been successfully
/// refreshed, which is distinct from a guild whose invite list is empty.
pub struct InviteSnapshotStore {
    guilds: DashMap<u64, HashMap<String, SnapshotEntry>>,
    resolve_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl InviteSnapshotStore {
    pub fn new() -> Self {
        Self {
            guilds: DashMap::new(),
            resolve_locks: DashMap::new(),
        }
    }

    /// Lock serializing join resolution for one guild. Joins in different
    /// guilds never contend.
    pub fn resolution_lock(&self, guild_id: u64) -> Arc<Mutex<()>> {
        self.resolve_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn get_map(&self, guild_id: u64) -> Option<HashMap<String, SnapshotEntry>> {
        self.guilds.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn replace(&self, guild_id: u64, entries: &[SnapshotEntry]) {
        let map = entries
            .iter()
            .map(|e| (e.code.clone(), e.clone()))
            .collect();
        self.guilds.insert(guild_id, map);
    }

    pub fn apply_invite_create(&self, guild_id: u64, entry: SnapshotEntry) {
        self.guilds
            .entry(guild_id)
            .or_default()
            .insert(entry.code.clone(), entry);
    }

    pub fn apply_invite_delete(&self, guild_id: u64, code: &str) {
        if let Some(mut map) = self.guilds.get_mut(&guild_id) {
            map.remove(code);
        }
    }

    pub fn forget_guild(&self, guild_id: u64) {
        self.guilds.remove(&guild_id);
        self.resolve_locks.remove(&guild_id);
    }

    /// Fetch the guild's live invite list and replace the stored map.
    /// Permission and network errors leave the prior snapshot intact.
    pub async fn refresh_guild(&self, ctx: &serenity::Context, guild_id: serenity::GuildId) {
        match fetch_live_invites(ctx, guild_id).await {
            Ok(entries) => {
                info!(
                    guild_id = guild_id.get(),
                    invites = entries.len(),
                    "Refreshed invite snapshot"
                );
                self.replace(guild_id.get(), &entries);
            }
            Err(e) if is_missing_permissions(&e) => {
                warn!(
                    guild_id = guild_id.get(),
                    "Missing Manage Guild permission, skipping invite snapshot refresh"
                );
            }
            Err(e) => {
                error!(
                    guild_id = guild_id.get(),
                    "Failed to refresh invite snapshot: {e:?}"
                );
            }
        }
    }

    pub async fn resync_all(&self, ctx: &serenity::Context, guild_ids: &[serenity::GuildId]) {
        info!(guilds = guild_ids.len(), "Resyncing invite snapshots");
        for guild_id in guild_ids {
            self.refresh_guild(ctx, *guild_id).await;
        }
    }
}

/// Fetch the current invite list directly from the platform, bypassing the
/// snapshot.
pub async fn fetch_live_invites(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
) -> Result<Vec<SnapshotEntry>, serenity::Error> {
    let invites = guild_id.invites(&ctx.http).await?;
    Ok(invites.iter().map(SnapshotEntry::from_invite).collect())
}

/// True for HTTP 403 responses, i.e. the bot lacks Manage Guild on this guild.
pub fn is_missing_permissions(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(resp)) => {
            resp.status_code.as_u16() == 403
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, uses: u64, inviter_id: Option<u64>) -> SnapshotEntry {
        SnapshotEntry {
            code: code.to_string(),
            uses,
            inviter_id,
            created_at: 0,
        }
    }

    #[test]
    fn test_unrefreshed_guild_has_no_map() {
        let store = InviteSnapshotStore::new();
        assert!(store.get_map(1).is_none());
    }

    #[test]
    fn test_replace_is_wholesale() {
        let store = InviteSnapshotStore::new();
        store.replace(1, &[entry("abc", 3, Some(10))]);
        store.replace(1, &[entry("def", 1, Some(11))]);

        let map = store.get_map(1).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("def"));
    }

    #[test]
    fn test_create_and_delete_patch_single_entries() {
        let store = InviteSnapshotStore::new();
        store.replace(1, &[entry("abc", 3, Some(10))]);
        store.apply_invite_create(1, entry("def", 0, Some(11)));
        store.apply_invite_delete(1, "abc");

        let map = store.get_map(1).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["def"].uses, 0);
    }

    #[test]
    fn test_create_event_seeds_guild_without_snapshot() {
        let store = InviteSnapshotStore::new();
        store.apply_invite_create(7, entry("abc", 0, None));
        assert_eq!(store.get_map(7).unwrap().len(), 1);
    }
}
