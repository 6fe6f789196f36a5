//! Feature flag gate.
//!
//! Flags are read-only lookups constructed once at startup and shared by
//! reference. Every voice operation checks its flag first and fails fast with
//! `FEATURE_DISABLED` when it is off.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::env_config::split_list;

/// Sessions, capture and orchestration.
pub const FLAG_VOICE_PLANNING: &str = "voice_planning";
/// Audio transcription through the speech-to-text provider.
pub const FLAG_VOICE_TRANSCRIPTION: &str = "voice_transcription";
/// Production and shadow commit of generated plans.
pub const FLAG_VOICE_PLAN_COMMIT: &str = "voice_plan_commit";
/// Rollback of committed plans. Independent of the commit flag.
pub const FLAG_VOICE_PLAN_ROLLBACK: &str = "voice_plan_rollback";
/// Forces production commits into shadow mode for the matching audience.
pub const FLAG_VOICE_PLAN_SHADOW_MODE: &str = "voice_plan_shadow_mode";
pub const FLAG_VOICE_PLAN_ALTERNATIVES: &str = "voice_plan_alternatives";
pub const FLAG_VOICE_PLAN_REFINEMENT: &str = "voice_plan_refinement";
/// Text-to-speech playback.
pub const FLAG_VOICE_SPEECH: &str = "voice_speech";

pub const ALL_FLAGS: &[&str] = &[
    FLAG_VOICE_PLANNING,
    FLAG_VOICE_TRANSCRIPTION,
    FLAG_VOICE_PLAN_COMMIT,
    FLAG_VOICE_PLAN_ROLLBACK,
    FLAG_VOICE_PLAN_SHADOW_MODE,
    FLAG_VOICE_PLAN_ALTERNATIVES,
    FLAG_VOICE_PLAN_REFINEMENT,
    FLAG_VOICE_SPEECH,
];

const FLAGS_ENV: &str = "VOICEPLAN_FLAGS";

/// Who is asking.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlagContext {
    pub user_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
}

impl FlagContext {
    #[must_use]
    pub const fn new(user_id: Uuid, organization_id: Uuid) -> Self {
        Self { user_id: Some(user_id), organization_id: Some(organization_id) }
    }
}

/// Audience rule for one flag. Empty allowlists mean "everyone".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlagRule {
    pub enabled: bool,
    #[serde(default)]
    pub organizations: Vec<Uuid>,
    #[serde(default)]
    pub users: Vec<Uuid>,
}

impl FlagRule {
    #[must_use]
    pub const fn on() -> Self {
        Self { enabled: true, organizations: Vec::new(), users: Vec::new() }
    }

    fn matches(&self, ctx: &FlagContext) -> bool {
        if !self.enabled {
            return false;
        }
        if self.organizations.is_empty() && self.users.is_empty() {
            return true;
        }
        let org_hit = ctx.organization_id.is_some_and(|org| self.organizations.contains(&org));
        let user_hit = ctx.user_id.is_some_and(|user| self.users.contains(&user));
        org_hit || user_hit
    }
}

/// Flag lookup seam; services hold an `Arc<dyn FeatureGate>`.
pub trait FeatureGate: Send + Sync {
    fn is_enabled(&self, flag: &str, ctx: &FlagContext) -> bool;
}

/// Config-backed flag set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureFlags {
    rules: HashMap<String, FlagRule>,
}

impl FeatureFlags {
    /// No flag enabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Every known flag enabled for everyone, except shadow mode.
    #[must_use]
    pub fn all_enabled() -> Self {
        let mut flags = Self::default();
        for flag in ALL_FLAGS.iter().filter(|f| **f != FLAG_VOICE_PLAN_SHADOW_MODE) {
            flags.rules.insert((*flag).to_owned(), FlagRule::on());
        }
        flags
    }

    #[must_use]
    pub fn with_rule(mut self, flag: &str, rule: FlagRule) -> Self {
        self.rules.insert(flag.to_owned(), rule);
        self
    }

    #[must_use]
    pub fn with_flag(self, flag: &str) -> Self {
        self.with_rule(flag, FlagRule::on())
    }

    #[must_use]
    pub fn without_flag(mut self, flag: &str) -> Self {
        self.rules.remove(flag);
        self
    }

    /// Read `VOICEPLAN_FLAGS` and the per-flag `VOICEPLAN_FLAG_<NAME>_ORGS` /
    /// `_USERS` allowlists.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut flags = Self::default();
        let Some(raw) = lookup(FLAGS_ENV) else {
            return flags;
        };
        for name in split_list(&raw) {
            let name = name.to_lowercase();
            if !ALL_FLAGS.contains(&name.as_str()) {
                tracing::warn!(flag = %name, "unknown feature flag in {FLAGS_ENV}, enabling anyway");
            }
            let upper = name.to_uppercase();
            let rule = FlagRule {
                enabled: true,
                organizations: parse_uuid_list(&lookup, &format!("VOICEPLAN_FLAG_{upper}_ORGS")),
                users: parse_uuid_list(&lookup, &format!("VOICEPLAN_FLAG_{upper}_USERS")),
            };
            flags.rules.insert(name, rule);
        }
        flags
    }

    #[must_use]
    pub fn enabled_flags(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.rules.iter().filter(|(_, r)| r.enabled).map(|(n, _)| n.as_str()).collect();
        names.sort_unstable();
        names
    }
}

fn parse_uuid_list(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Vec<Uuid> {
    let Some(raw) = lookup(var) else {
        return Vec::new();
    };
    split_list(&raw)
        .into_iter()
        .filter_map(|item| match item.parse::<Uuid>() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(var, value = %item, error = %e, "ignoring invalid uuid in flag allowlist");
                None
            },
        })
        .collect()
}

impl FeatureGate for FeatureFlags {
    fn is_enabled(&self, flag: &str, ctx: &FlagContext) -> bool {
        self.rules.get(flag).is_some_and(|rule| rule.matches(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn disabled_by_default() {
        let flags = FeatureFlags::from_lookup(|_| None);
        let ctx = FlagContext::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(!flags.is_enabled(FLAG_VOICE_PLANNING, &ctx));
        assert!(flags.enabled_flags().is_empty());
    }

    #[test]
    fn env_list_enables_for_everyone() {
        let flags = FeatureFlags::from_lookup(lookup(&[(
            "VOICEPLAN_FLAGS",
            "voice_planning, VOICE_PLAN_COMMIT".to_owned(),
        )]));
        let ctx = FlagContext::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(flags.is_enabled(FLAG_VOICE_PLANNING, &ctx));
        assert!(flags.is_enabled(FLAG_VOICE_PLAN_COMMIT, &ctx));
        assert!(!flags.is_enabled(FLAG_VOICE_PLAN_ROLLBACK, &ctx));
    }

    #[test]
    fn allowlists_restrict_audience() {
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        let flags = FeatureFlags::from_lookup(lookup(&[
            ("VOICEPLAN_FLAGS", "voice_plan_commit".to_owned()),
            ("VOICEPLAN_FLAG_VOICE_PLAN_COMMIT_ORGS", format!("{org}, not-a-uuid")),
            ("VOICEPLAN_FLAG_VOICE_PLAN_COMMIT_USERS", user.to_string()),
        ]));
        let outsider = FlagContext::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(!flags.is_enabled(FLAG_VOICE_PLAN_COMMIT, &outsider));
        assert!(flags.is_enabled(FLAG_VOICE_PLAN_COMMIT, &FlagContext::new(Uuid::new_v4(), org)));
        assert!(flags.is_enabled(FLAG_VOICE_PLAN_COMMIT, &FlagContext::new(user, Uuid::new_v4())));
        assert!(!flags.is_enabled(FLAG_VOICE_PLAN_COMMIT, &FlagContext::default()));
    }

    #[test]
    fn all_enabled_leaves_shadow_mode_off() {
        let flags = FeatureFlags::all_enabled();
        let ctx = FlagContext::default();
        assert!(flags.is_enabled(FLAG_VOICE_PLAN_ROLLBACK, &ctx));
        assert!(!flags.is_enabled(FLAG_VOICE_PLAN_SHADOW_MODE, &ctx));
        let flags = flags.without_flag(FLAG_VOICE_PLAN_ROLLBACK);
        assert!(!flags.is_enabled(FLAG_VOICE_PLAN_ROLLBACK, &ctx));
    }
}
