use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use profile_integrations::FavoriteKind;

use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Guest-equivalent role every new profile starts with.
    #[default]
    Student,
    Organizer,
    Instructor,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "organizer" => Some(Role::Organizer),
            "instructor" => Some(Role::Instructor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ExperienceLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "beginner" => Some(ExperienceLevel::Beginner),
            "intermediate" => Some(ExperienceLevel::Intermediate),
            "advanced" => Some(ExperienceLevel::Advanced),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Favorites {
    pub retreats: BTreeSet<String>,
    pub instructors: BTreeSet<String>,
}

impl Favorites {
    pub fn get(&self, kind: FavoriteKind) -> &BTreeSet<String> {
        match kind {
            FavoriteKind::Retreat => &self.retreats,
            FavoriteKind::Instructor => &self.instructors,
        }
    }

    pub fn get_mut(&mut self, kind: FavoriteKind) -> &mut BTreeSet<String> {
        match kind {
            FavoriteKind::Retreat => &mut self.retreats,
            FavoriteKind::Instructor => &mut self.instructors,
        }
    }

    pub fn contains(&self, kind: FavoriteKind, id: &str) -> bool {
        self.get(kind).contains(id)
    }

    pub fn union(&self, other: &Favorites) -> Favorites {
        Favorites {
            retreats: self.retreats.union(&other.retreats).cloned().collect(),
            instructors: self
                .instructors
                .union(&other.instructors)
                .cloned()
                .collect(),
        }
    }
}

/// The user profile as stored on the device and in the remote document.
///
/// Every field is defaulted on read so older or partially written records
/// still load.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
    pub language: String,
    pub role: Role,
    pub bio: BTreeMap<String, String>,
    pub experience_level: Option<ExperienceLevel>,
    pub interests: BTreeSet<String>,
    pub location: String,
    pub spoken_languages: BTreeSet<String>,
    pub favorites: Favorites,
    pub joined_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl Profile {
    pub fn new_anonymous(device_id: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: device_id.into(),
            joined_at: Some(now),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    pub fn is_favorite(&self, kind: FavoriteKind, id: &str) -> bool {
        self.favorites.contains(kind, id)
    }
}

/// A partial profile edit. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileEdit {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub language: Option<String>,
    pub role: Option<Role>,
    pub bio: Option<(String, String)>,
    pub experience_level: Option<Option<ExperienceLevel>>,
    pub interests: Option<BTreeSet<String>>,
    pub location: Option<String>,
    pub spoken_languages: Option<BTreeSet<String>>,
}

impl ProfileEdit {
    pub fn is_empty(&self) -> bool {
        self == &ProfileEdit::default()
    }

    pub fn apply(&self, profile: &mut Profile) {
        if let Some(value) = &self.display_name {
            profile.display_name = value.trim().to_string();
        }
        if let Some(value) = &self.avatar_url {
            profile.avatar_url = value.trim().to_string();
        }
        if let Some(value) = &self.language {
            profile.language = value.trim().to_string();
        }
        if let Some(role) = self.role {
            profile.role = role;
        }
        if let Some((language, text)) = &self.bio {
            if text.trim().is_empty() {
                profile.bio.remove(language);
            } else {
                profile.bio.insert(language.clone(), text.clone());
            }
        }
        if let Some(level) = self.experience_level {
            profile.experience_level = level;
        }
        if let Some(interests) = &self.interests {
            profile.interests = interests.clone();
        }
        if let Some(value) = &self.location {
            profile.location = value.trim().to_string();
        }
        if let Some(languages) = &self.spoken_languages {
            profile.spoken_languages = languages.clone();
        }
    }
}

/// Change notifications delivered to presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProfileEvent {
    #[serde(rename_all = "camelCase")]
    ProfileChanged { profile: Profile },
    #[serde(rename_all = "camelCase")]
    FavoriteChanged {
        kind: FavoriteKind,
        id: String,
        member: bool,
    },
}
