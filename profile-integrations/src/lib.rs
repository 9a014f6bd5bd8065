pub mod ids;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kinds of items a user can favorite. Each kind is an independent set on the
/// profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteKind {
    Retreat,
    Instructor,
}

impl FavoriteKind {
    pub const ALL: [FavoriteKind; 2] = [FavoriteKind::Retreat, FavoriteKind::Instructor];

    pub fn as_str(&self) -> &'static str {
        match self {
            FavoriteKind::Retreat => "retreat",
            FavoriteKind::Instructor => "instructor",
        }
    }

    /// Name of the set inside the `favorites` object.
    pub fn collection_key(&self) -> &'static str {
        match self {
            FavoriteKind::Retreat => "retreats",
            FavoriteKind::Instructor => "instructors",
        }
    }

    /// Dotted document path used for server-side set transforms.
    pub fn field_path(&self) -> String {
        format!("favorites.{}", self.collection_key())
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "retreat" | "retreats" => Some(FavoriteKind::Retreat),
            "instructor" | "instructors" => Some(FavoriteKind::Instructor),
            _ => None,
        }
    }
}

impl fmt::Display for FavoriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
