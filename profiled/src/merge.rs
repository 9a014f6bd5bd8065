//! Reconciliation of the device profile with the remote document.
//!
//! The rules are stated once in [`FIELD_POLICIES`]:
//!
//! | policy | fields |
//! |---|---|
//! | `Identity` | `id` becomes the new identity |
//! | `LastWriterWins` | every scalar and mapping field, decided by `updatedAt` as one group |
//! | `SetUnion` | `favorites` |
//! | `Earliest` | `joinedAt` |
//! | `MergeStamp` | `updatedAt` is set to the merge time |
//!
//! For the last-writer-wins group, local wins only with a strictly later
//! `updatedAt`; ties go to the remote copy. A winner's empty value never
//! replaces a populated one. The whole group shares a single timestamp, so an
//! older unsynced edit on the losing side can be discarded by a newer edit to
//! an unrelated field on the winning side.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Profile, Role};
use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    Identity,
    LastWriterWins,
    SetUnion,
    Earliest,
    MergeStamp,
}

/// Merge policy per serialized profile field.
pub const FIELD_POLICIES: &[(&str, FieldPolicy)] = &[
    ("id", FieldPolicy::Identity),
    ("displayName", FieldPolicy::LastWriterWins),
    ("avatarUrl", FieldPolicy::LastWriterWins),
    ("language", FieldPolicy::LastWriterWins),
    ("role", FieldPolicy::LastWriterWins),
    ("bio", FieldPolicy::LastWriterWins),
    ("experienceLevel", FieldPolicy::LastWriterWins),
    ("interests", FieldPolicy::LastWriterWins),
    ("location", FieldPolicy::LastWriterWins),
    ("spokenLanguages", FieldPolicy::LastWriterWins),
    ("favorites", FieldPolicy::SetUnion),
    ("joinedAt", FieldPolicy::Earliest),
    ("updatedAt", FieldPolicy::MergeStamp),
];

pub fn field_policy(field: &str) -> Option<FieldPolicy> {
    FIELD_POLICIES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, policy)| *policy)
}

/// Which side supplies the last-writer-wins group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

pub fn scalar_winner(local: &Profile, remote: &Profile) -> Winner {
    if local.updated_at > remote.updated_at {
        Winner::Local
    } else {
        Winner::Remote
    }
}

/// Merges with the current time as the merge stamp.
pub fn merge(local: &Profile, remote: Option<&Profile>, new_identity: &str) -> Profile {
    merge_at(local, remote, new_identity, Timestamp::now())
}

/// Pure merge of the device profile with the remote document (if any) for
/// `new_identity`, stamped with `now`.
pub fn merge_at(
    local: &Profile,
    remote: Option<&Profile>,
    new_identity: &str,
    now: Timestamp,
) -> Profile {
    let Some(remote) = remote else {
        return Profile {
            id: new_identity.to_string(),
            updated_at: Some(now),
            ..local.clone()
        };
    };

    let (winner, loser) = match scalar_winner(local, remote) {
        Winner::Local => (local, remote),
        Winner::Remote => (remote, local),
    };

    Profile {
        id: new_identity.to_string(),
        display_name: prefer_present(&winner.display_name, &loser.display_name),
        avatar_url: prefer_present(&winner.avatar_url, &loser.avatar_url),
        language: prefer_present(&winner.language, &loser.language),
        role: prefer_present(&winner.role, &loser.role),
        bio: prefer_present(&winner.bio, &loser.bio),
        experience_level: prefer_present(&winner.experience_level, &loser.experience_level),
        interests: prefer_present(&winner.interests, &loser.interests),
        location: prefer_present(&winner.location, &loser.location),
        spoken_languages: prefer_present(&winner.spoken_languages, &loser.spoken_languages),
        favorites: local.favorites.union(&remote.favorites),
        joined_at: earliest(local.joined_at, remote.joined_at),
        updated_at: Some(now),
    }
}

fn earliest(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn prefer_present<T: Presence + Clone>(winner: &T, loser: &T) -> T {
    if winner.is_present() || !loser.is_present() {
        winner.clone()
    } else {
        loser.clone()
    }
}

/// Whether a field carries a value worth keeping over the other side's.
trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<T> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl<T> Presence for BTreeSet<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V> Presence for BTreeMap<K, V> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for Role {
    // The guest-equivalent default never overrides an assigned role.
    fn is_present(&self) -> bool {
        *self != Role::Student
    }
}
