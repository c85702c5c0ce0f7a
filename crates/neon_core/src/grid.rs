//! Tactical grid: bounds and cover.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

use crate::math::{percent, Fixed, GridPos};

/// Positional protection of the tile a target stands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Cover {
    /// Open ground.
    #[default]
    None,
    /// Low wall, car door, crate.
    Half,
    /// Pillar, doorway, full wall corner.
    Full,
}

impl Cover {
    /// Hit chance penalty in percentage points.
    #[must_use]
    pub const fn hit_penalty(self) -> u32 {
        match self {
            Cover::None => 0,
            Cover::Half => 25,
            Cover::Full => 40,
        }
    }

    /// Fraction of post-armor damage that gets through.
    #[must_use]
    pub fn damage_factor(self) -> Fixed {
        match self {
            Cover::None => Fixed::ONE,
            Cover::Half => percent(75),
            Cover::Full => percent(60),
        }
    }
}

/// Rectangular battlefield `[0, width) x [0, height)` with sparse cover.
///
/// Loading goes through [`Grid::set_cover`], so off-grid cover tiles in a
/// data file are dropped the same way the builder drops them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "GridData")]
pub struct Grid {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// Tiles offering cover; absent tiles are open ground.
    #[serde(serialize_with = "cover_list")]
    cover: BTreeMap<GridPos, Cover>,
}

/// On-disk shape of a [`Grid`].
#[derive(Deserialize)]
#[serde(rename = "Grid")]
struct GridData {
    width: u32,
    height: u32,
    #[serde(default)]
    cover: Vec<(GridPos, Cover)>,
}

impl From<GridData> for Grid {
    fn from(data: GridData) -> Self {
        let mut grid = Grid::new(data.width, data.height);
        for (pos, cover) in data.cover {
            grid.set_cover(pos, cover);
        }
        grid
    }
}

impl Grid {
    /// Create an open grid.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cover: BTreeMap::new(),
        }
    }

    /// Builder method to place cover on a tile.
    #[must_use]
    pub fn with_cover(mut self, pos: GridPos, cover: Cover) -> Self {
        self.set_cover(pos, cover);
        self
    }

    /// Place or clear cover on a tile. Out-of-bounds tiles are ignored.
    pub fn set_cover(&mut self, pos: GridPos, cover: Cover) {
        if !self.in_bounds(pos) {
            return;
        }
        if cover == Cover::None {
            self.cover.remove(&pos);
        } else {
            self.cover.insert(pos, cover);
        }
    }

    /// Cover on a tile.
    #[must_use]
    pub fn cover_at(&self, pos: GridPos) -> Cover {
        self.cover.get(&pos).copied().unwrap_or_default()
    }

    /// Whether a tile lies inside the grid.
    #[must_use]
    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    /// Tiles within `radius` (Manhattan) of `center`, clipped to the grid,
    /// in row-major order.
    pub fn tiles_within(&self, center: GridPos, radius: u32) -> impl Iterator<Item = GridPos> + '_ {
        let r = radius as i32;
        (center.y - r..=center.y + r)
            .flat_map(move |y| (center.x - r..=center.x + r).map(move |x| GridPos::new(x, y)))
            .filter(move |p| self.in_bounds(*p) && p.manhattan_distance(center) <= radius)
    }

    /// Covered tiles in row-major order.
    pub fn covered_tiles(&self) -> impl Iterator<Item = (GridPos, Cover)> + '_ {
        let mut tiles: Vec<_> = self.cover.iter().map(|(p, c)| (*p, *c)).collect();
        tiles.sort_by_key(|(p, _)| p.scan_key());
        tiles.into_iter()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(12, 12)
    }
}

/// Serializes the cover map as a list of `(tile, cover)` pairs so that
/// formats without structured map keys (JSON) can carry it.
fn cover_list<S>(value: &BTreeMap<GridPos, Cover>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let pairs: Vec<(GridPos, Cover)> = value.iter().map(|(p, c)| (*p, *c)).collect();
    pairs.serialize(serializer)
}
