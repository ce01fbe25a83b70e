pub mod guild_invite_settings;
pub mod invite_ledger;
pub mod inviter_counters;
