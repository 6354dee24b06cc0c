//! Tile records and the field payloads used to create or edit them.

use serde::{Deserialize, Serialize};

use crate::coordinate::CoordId;

/// Prefix of ids minted locally for optimistic creations.
pub const PROVISIONAL_ID_PREFIX: &str = "temp-";

/// A tile as held in the cache.
///
/// Keyed in the cache by `coord_id`. `persistent_id` is the stable server
/// identity and survives moves, `coord_id` does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    pub coord_id: CoordId,
    pub persistent_id: String,
    pub parent_coord_id: Option<CoordId>,
    pub depth: u32,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub link: String,
    pub color_token: String,
}

impl TileRecord {
    /// True when the record was synthesized locally and has not been
    /// confirmed by the server yet.
    pub fn is_provisional(&self) -> bool {
        self.persistent_id.starts_with(PROVISIONAL_ID_PREFIX)
    }

    /// Overwrite the fields named in `patch`, leaving the rest untouched.
    pub fn apply_patch(&mut self, patch: &TilePatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(link) = &patch.link {
            self.link = link.clone();
        }
        if let Some(color_token) = &patch.color_token {
            self.color_token = color_token.clone();
        }
    }

    /// Copy of this record relocated to `coord_id`.
    pub fn relocated(&self, coord_id: CoordId) -> TileRecord {
        let parent_coord_id = coord_id.parent();
        let depth = coord_id.depth().map(|d| d as u32).unwrap_or(self.depth);
        TileRecord {
            coord_id,
            parent_coord_id,
            depth,
            ..self.clone()
        }
    }
}

/// Content for a new tile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TileFields {
    pub title: String,
    pub description: String,
    pub link: String,
    pub color_token: Option<String>,
    pub owner_id: Option<String>,
}

impl TileFields {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial edit of a tile; `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TilePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub color_token: Option<String>,
}

impl TilePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.link.is_none()
            && self.color_token.is_none()
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TileRecord {
        TileRecord {
            coord_id: CoordId::from_raw("1,0:1"),
            persistent_id: "42".to_string(),
            parent_coord_id: Some(CoordId::from_raw("1,0")),
            depth: 1,
            owner_id: "user-1".to_string(),
            title: "Roots".to_string(),
            description: "desc".to_string(),
            link: String::new(),
            color_token: "zinc-50".to_string(),
        }
    }

    #[test]
    fn test_apply_patch_only_touches_named_fields() {
        let mut tile = record();
        tile.apply_patch(&TilePatch {
            title: Some("Branches".to_string()),
            link: Some("https://example.com".to_string()),
            ..Default::default()
        });
        assert_eq!(tile.title, "Branches");
        assert_eq!(tile.link, "https://example.com");
        assert_eq!(tile.description, "desc");
        assert_eq!(tile.color_token, "zinc-50");
    }

    #[test]
    fn test_empty_patch() {
        assert!(TilePatch::default().is_empty());
        assert!(!TilePatch::title("x").is_empty());
    }

    #[test]
    fn test_provisional_detection() {
        let mut tile = record();
        assert!(!tile.is_provisional());
        tile.persistent_id = format!("{}abc", PROVISIONAL_ID_PREFIX);
        assert!(tile.is_provisional());
    }

    #[test]
    fn test_relocated_updates_structure() {
        let tile = record().relocated(CoordId::from_raw("1,0:4,5"));
        assert_eq!(tile.coord_id.as_str(), "1,0:4,5");
        assert_eq!(tile.parent_coord_id, Some(CoordId::from_raw("1,0:4")));
        assert_eq!(tile.depth, 2);
        assert_eq!(tile.persistent_id, "42");
    }
}
