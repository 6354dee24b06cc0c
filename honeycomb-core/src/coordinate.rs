//! Coordinate identifiers for tiles in the hexagonal tree.
//!
//! A coordinate is a pair of scope integers followed by a path of directional
//! steps, encoded as `scopeA,scopeB[:step1,step2,...]`. Every tile has up to
//! six children, one per [`Direction`].
//!
//! Ancestor and descendant checks work on the parsed path, never on the raw
//! string, so `1,0:1` is not mistaken for an ancestor of `1,0:12`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoordinateError;

/// A single step from a tile to one of its six children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Direction {
    NorthWest = 1,
    NorthEast = 2,
    East = 3,
    SouthEast = 4,
    SouthWest = 5,
    West = 6,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::NorthWest,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::SouthWest,
        Direction::West,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        direction.as_u8()
    }
}

impl TryFrom<u8> for Direction {
    type Error = CoordinateError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::NorthWest),
            2 => Ok(Direction::NorthEast),
            3 => Ok(Direction::East),
            4 => Ok(Direction::SouthEast),
            5 => Ok(Direction::SouthWest),
            6 => Ok(Direction::West),
            other => Err(CoordinateError::InvalidDirection {
                value: other.to_string(),
            }),
        }
    }
}

/// Parsed form of a coordinate identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub scope_a: i64,
    pub scope_b: i64,
    pub path: Vec<Direction>,
}

impl Coordinate {
    /// Create a root coordinate (empty path).
    pub fn root(scope_a: i64, scope_b: i64) -> Self {
        Self {
            scope_a,
            scope_b,
            path: Vec::new(),
        }
    }

    pub fn new(scope_a: i64, scope_b: i64, path: Vec<Direction>) -> Self {
        Self {
            scope_a,
            scope_b,
            path,
        }
    }

    /// Parse a coordinate identifier string.
    pub fn parse(input: &str) -> Result<Self, CoordinateError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoordinateError::Empty);
        }

        let (scope_part, path_part) = match trimmed.split_once(':') {
            Some((scope, path)) => (scope, Some(path)),
            None => (trimmed, None),
        };

        let (a, b) = scope_part
            .split_once(',')
            .ok_or_else(|| CoordinateError::MalformedScope {
                input: input.to_string(),
            })?;
        let scope_a = parse_scope(a, input)?;
        let scope_b = parse_scope(b, input)?;

        let path = match path_part {
            None => Vec::new(),
            Some("") => Vec::new(),
            Some(steps) => steps
                .split(',')
                .map(|step| {
                    let value: u8 =
                        step.trim()
                            .parse()
                            .map_err(|_| CoordinateError::InvalidDirection {
                                value: step.to_string(),
                            })?;
                    Direction::try_from(value)
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(Self {
            scope_a,
            scope_b,
            path,
        })
    }

    /// Depth in the tree; roots are depth zero.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Parent coordinate, or `None` for a root.
    pub fn parent(&self) -> Option<Coordinate> {
        if self.path.is_empty() {
            return None;
        }
        let mut path = self.path.clone();
        path.pop();
        Some(Coordinate {
            scope_a: self.scope_a,
            scope_b: self.scope_b,
            path,
        })
    }

    pub fn child(&self, direction: Direction) -> Coordinate {
        let mut path = self.path.clone();
        path.push(direction);
        Coordinate {
            scope_a: self.scope_a,
            scope_b: self.scope_b,
            path,
        }
    }

    pub fn children(&self) -> Vec<Coordinate> {
        Direction::ALL.iter().map(|d| self.child(*d)).collect()
    }

    /// The last step of the path.
    pub fn direction(&self) -> Option<Direction> {
        self.path.last().copied()
    }

    pub fn same_scope(&self, other: &Coordinate) -> bool {
        self.scope_a == other.scope_a && self.scope_b == other.scope_b
    }

    /// Strict ancestor check: same scope and `self.path` is a proper prefix
    /// of `other.path`.
    pub fn is_ancestor_of(&self, other: &Coordinate) -> bool {
        self.same_scope(other)
            && self.path.len() < other.path.len()
            && other.path.starts_with(&self.path)
    }

    pub fn is_descendant_of(&self, other: &Coordinate) -> bool {
        other.is_ancestor_of(self)
    }

    /// Number of generations between `self` and a descendant, `None` when
    /// `descendant` is not inside this subtree (self counts as zero).
    pub fn generation_distance(&self, descendant: &Coordinate) -> Option<usize> {
        if self == descendant {
            return Some(0);
        }
        if self.is_ancestor_of(descendant) {
            Some(descendant.depth() - self.depth())
        } else {
            None
        }
    }

    /// Re-root this coordinate from `old_root` onto `new_root`.
    ///
    /// Returns `None` when `self` is neither `old_root` nor inside it.
    pub fn rebase(&self, old_root: &Coordinate, new_root: &Coordinate) -> Option<Coordinate> {
        if self != old_root && !old_root.is_ancestor_of(self) {
            return None;
        }
        let mut path = new_root.path.clone();
        path.extend_from_slice(&self.path[old_root.path.len()..]);
        Some(Coordinate {
            scope_a: new_root.scope_a,
            scope_b: new_root.scope_b,
            path,
        })
    }

    pub fn to_id(&self) -> CoordId {
        CoordId(self.to_string())
    }
}

fn parse_scope(raw: &str, input: &str) -> Result<i64, CoordinateError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| CoordinateError::MalformedScope {
            input: input.to_string(),
        })
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.scope_a, self.scope_b)?;
        if !self.path.is_empty() {
            f.write_str(":")?;
            for (i, step) in self.path.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}", step.as_u8())?;
            }
        }
        Ok(())
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Coordinate::parse(s)
    }
}

/// Canonical string form of a coordinate, used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoordId(String);

impl CoordId {
    /// Parse and canonicalize a coordinate string.
    pub fn parse(input: &str) -> Result<Self, CoordinateError> {
        Coordinate::parse(input).map(|c| c.to_id())
    }

    /// Wrap a string without validating it.
    ///
    /// Server payloads are trusted as-is; consumers that need structure call
    /// [`CoordId::coordinate`].
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn coordinate(&self) -> Result<Coordinate, CoordinateError> {
        Coordinate::parse(&self.0)
    }

    pub fn depth(&self) -> Option<usize> {
        self.coordinate().ok().map(|c| c.depth())
    }

    pub fn parent(&self) -> Option<CoordId> {
        self.coordinate()
            .ok()
            .and_then(|c| c.parent())
            .map(|c| c.to_id())
    }
}

impl fmt::Display for CoordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Coordinate> for CoordId {
    fn from(coordinate: Coordinate) -> Self {
        coordinate.to_id()
    }
}

impl From<&Coordinate> for CoordId {
    fn from(coordinate: &Coordinate) -> Self {
        coordinate.to_id()
    }
}

impl AsRef<str> for CoordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
