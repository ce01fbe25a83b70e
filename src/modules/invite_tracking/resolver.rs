use crate::modules::invite_tracking::snapshot::{
    fetch_live_invites, is_missing_permissions, SnapshotEntry,
};
use crate::modules::invite_tracking::welcome;
use crate::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Accounts younger than this at join time are classified as fake.
pub const FAKE_ACCOUNT_MAX_AGE_HOURS: i64 = 24;

/// How a join was matched to an invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub code: String,
    pub inviter_id: u64,
    /// True when the diff was inconclusive and the highest-uses heuristic
    /// picked the invite instead.
    pub fallback: bool,
}

/// Diff the live list against the snapshot: the invite whose use count
/// incremented is the one that was consumed. Codes absent from the snapshot
/// count as zero prior uses. At most one invite increments per join under
/// normal conditions; iteration order decides ties.
pub fn find_used_invite(
    old: &HashMap<String, SnapshotEntry>,
    live: &[SnapshotEntry],
) -> Option<SnapshotEntry> {
    for invite in live {
        let old_uses = old.get(&invite.code).map(|e| e.uses).unwrap_or(0);
        if invite.uses > old_uses {
            return Some(invite.clone());
        }
    }
    None
}

/// Best-effort guess when diffing is inconclusive: the invite with the most
/// uses among those whose inviter is still resolvable.
pub fn pick_fallback(live: &[SnapshotEntry]) -> Option<SnapshotEntry> {
    live.iter()
        .filter(|invite| invite.inviter_id.is_some())
        .max_by_key(|invite| invite.uses)
        .cloned()
}

pub fn is_fake_account(account_created_unix: i64, now_unix: i64) -> bool {
    now_unix - account_created_unix < FAKE_ACCOUNT_MAX_AGE_HOURS * 3600
}

fn fallback_attribution(live: &[SnapshotEntry]) -> Option<Attribution> {
    let picked = pick_fallback(live)?;
    let inviter_id = picked.inviter_id?;
    Some(Attribution {
        code: picked.code,
        inviter_id,
        fallback: true,
    })
}

/// Entry point for a member-join gateway event. Never propagates an error to
/// the dispatcher: every failure path degrades or drops with a log line.
pub async fn handle_member_join(
    ctx: &serenity::Context,
    member: &serenity::Member,
    data: &Data,
) -> Result<(), Error> {
    if member.user.bot {
        return Ok(());
    }

    let guild_id = member.guild_id;
    let user_id = member.user.id;

    // Steps serialized per guild: read snapshot, fetch live, diff, replace.
    // Joins for other guilds are unaffected by this lock.
    let lock = data.snapshots.resolution_lock(guild_id.get());
    let (old, live) = {
        let _guard = lock.lock().await;

        if data.snapshots.get_map(guild_id.get()).is_none() {
            data.snapshots.refresh_guild(ctx, guild_id).await;
        }
        let old = data.snapshots.get_map(guild_id.get());

        let live = match fetch_live_invites(ctx, guild_id).await {
            Ok(entries) => entries,
            Err(e) if is_missing_permissions(&e) => {
                warn!(
                    guild_id = guild_id.get(),
                    user_id = user_id.get(),
                    "Missing Manage Guild permission, cannot attribute join"
                );
                return Ok(());
            }
            Err(e) => {
                error!(
                    guild_id = guild_id.get(),
                    user_id = user_id.get(),
                    "Failed to fetch live invites, dropping join: {e:?}"
                );
                return Ok(());
            }
        };

        data.snapshots.replace(guild_id.get(), &live);
        (old, live)
    };

    let attribution = match resolve(ctx, guild_id, old, &live).await {
        Some(attribution) => attribution,
        None => {
            info!(
                guild_id = guild_id.get(),
                user_id = user_id.get(),
                "Unresolved join: no attribution recorded"
            );
            return Ok(());
        }
    };

    if attribution.fallback {
        warn!(
            guild_id = guild_id.get(),
            user_id = user_id.get(),
            code = %attribution.code,
            inviter_id = attribution.inviter_id,
            "Attributed join via fallback heuristic"
        );
    } else {
        info!(
            guild_id = guild_id.get(),
            user_id = user_id.get(),
            code = %attribution.code,
            inviter_id = attribution.inviter_id,
            "Attributed join via invite diff"
        );
    }

    let is_fake = is_fake_account(
        member.user.id.created_at().unix_timestamp(),
        Utc::now().timestamp(),
    );

    if let Err(e) = data
        .ledger
        .record_join(
            guild_id.get() as i64,
            user_id.get() as i64,
            attribution.inviter_id as i64,
            is_fake,
        )
        .await
    {
        error!(
            guild_id = guild_id.get(),
            user_id = user_id.get(),
            "Failed to record join in ledger: {e:?}"
        );
        return Ok(());
    }

    dispatch_welcome(ctx, member, data, attribution.inviter_id).await;

    Ok(())
}

/// Pick a candidate from the diff, probe for vanity-URL consumption when the
/// diff is silent, and otherwise fall back to the heuristic.
async fn resolve(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    old: Option<HashMap<String, SnapshotEntry>>,
    live: &[SnapshotEntry],
) -> Option<Attribution> {
    let Some(old) = old else {
        // Snapshot unusable (refresh failed), the diff would claim every
        // nonzero invite. Go straight to the heuristic.
        warn!(
            guild_id = guild_id.get(),
            "No usable invite snapshot, using fallback heuristic"
        );
        return fallback_attribution(live);
    };

    match find_used_invite(&old, live) {
        Some(candidate) => match candidate.inviter_id {
            Some(inviter_id) => Some(Attribution {
                code: candidate.code,
                inviter_id,
                fallback: false,
            }),
            None => {
                // Inviter account no longer resolvable. Never write a
                // ledger row without an inviter.
                warn!(
                    guild_id = guild_id.get(),
                    code = %candidate.code,
                    "Used invite has no resolvable inviter, using fallback heuristic"
                );
                fallback_attribution(live)
            }
        },
        None => {
            if has_vanity_url(ctx, guild_id).await {
                // Vanity joins are detected but not attributed to anyone.
                info!(
                    guild_id = guild_id.get(),
                    "Unresolved join: vanity URL consumption suspected"
                );
                return None;
            }
            warn!(
                guild_id = guild_id.get(),
                "No incrementing invite found, using fallback heuristic"
            );
            fallback_attribution(live)
        }
    }
}

async fn has_vanity_url(ctx: &serenity::Context, guild_id: serenity::GuildId) -> bool {
    let cached = ctx
        .cache
        .guild(guild_id)
        .map(|g| g.vanity_url_code.is_some());
    if let Some(known) = cached {
        return known;
    }

    match guild_id.to_partial_guild(&ctx.http).await {
        Ok(guild) => guild.vanity_url_code.is_some(),
        Err(e) => {
            warn!(
                guild_id = guild_id.get(),
                "Failed to fetch guild for vanity check: {e:?}"
            );
            false
        }
    }
}

async fn dispatch_welcome(
    ctx: &serenity::Context,
    member: &serenity::Member,
    data: &Data,
    inviter_id: u64,
) {
    let guild_id = member.guild_id.get() as i64;

    let settings = match data.settings.get(guild_id).await {
        Ok(settings) => settings,
        Err(e) => {
            error!(guild_id, "Failed to load settings for welcome: {e:?}");
            return;
        }
    };

    if !settings.enable_welcome || settings.welcome_channel_id.is_none() {
        return;
    }

    let counts = match data
        .ledger
        .get_counts(&settings, guild_id, inviter_id as i64)
        .await
    {
        Ok(counts) => counts,
        Err(e) => {
            error!(guild_id, inviter_id, "Failed to load counts for welcome: {e:?}");
            return;
        }
    };

    welcome::send_welcome(ctx, &settings, member, inviter_id, counts.total).await;
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

    fn snapshot(entries: &[SnapshotEntry]) -> HashMap<String, SnapshotEntry> {
        entries.iter().map(|e| (e.code.clone(), e.clone())).collect()
    }

    #[test]
    fn test_incremented_invite_is_candidate() {
        let old = snapshot(&[entry("abc", 3, Some(10)), entry("def", 5, Some(11))]);
        let live = vec![entry("abc", 4, Some(10)), entry("def", 5, Some(11))];

        let used = find_used_invite(&old, &live).unwrap();
        assert_eq!(used.code, "abc");
        assert_eq!(used.inviter_id, Some(10));
    }

    #[test]
    fn test_unseen_code_with_uses_is_candidate() {
        let old = snapshot(&[entry("abc", 3, Some(10))]);
        let live = vec![entry("abc", 3, Some(10)), entry("new", 1, Some(12))];

        let used = find_used_invite(&old, &live).unwrap();
        assert_eq!(used.code, "new");
    }

    #[test]
    fn test_unseen_unused_code_is_not_candidate() {
        let old = snapshot(&[entry("abc", 3, Some(10))]);
        let live = vec![entry("abc", 3, Some(10)), entry("new", 0, Some(12))];

        assert_eq!(find_used_invite(&old, &live), None);
    }

    #[test]
    fn test_no_increment_yields_no_candidate() {
        let old = snapshot(&[entry("abc", 3, Some(10))]);
        let live = vec![entry("abc", 3, Some(10))];

        assert_eq!(find_used_invite(&old, &live), None);
    }

    #[test]
    fn test_fallback_picks_highest_uses_with_inviter() {
        let live = vec![
            entry("abc", 9, None),
            entry("def", 5, Some(11)),
            entry("ghi", 2, Some(12)),
        ];

        let picked = pick_fallback(&live).unwrap();
        assert_eq!(picked.code, "def");
    }

    #[test]
    fn test_fallback_with_no_resolvable_inviter() {
        let live = vec![entry("abc", 9, None)];
        assert_eq!(pick_fallback(&live), None);
    }

    #[test]
    fn test_account_age_threshold() {
        let now = 1_700_000_000;
        let threshold = FAKE_ACCOUNT_MAX_AGE_HOURS * 3600;

        assert!(is_fake_account(now - threshold + 1, now));
        assert!(!is_fake_account(now - threshold, now));
        assert!(!is_fake_account(now - threshold - 1, now));
    }
}
