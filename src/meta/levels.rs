
//! Resolution levels of tiled parts.
//! Computes which levels exist, how large each of them is,
//! and which range of the offset table belongs to which level.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::math::{RoundingMode, Vec2};
use crate::meta::attribute::{LevelMode, TileDescription};


/// Compute the number of tiles required to contain all values.
pub fn compute_block_count(full_res: usize, tile_size: usize) -> usize {
    // round up, because if the image is not evenly divisible by the tiles,
    // we add another tile at the end (which is only partially used)
    RoundingMode::Up.divide(full_res, tile_size)
}

/// Calculate number of mip levels in a given resolution.
pub fn compute_level_count(round: RoundingMode, full_res: usize) -> usize {
    round.log2(full_res) + 1
}

/// Calculate the size of a single mip level by index.
/// A dimension stops shrinking as soon as it reaches one pixel.
pub fn compute_level_size(round: RoundingMode, full_res: usize, level_index: usize) -> usize {
    let divisor = 1_usize.checked_shl(level_index as u32).unwrap_or(0);
    if divisor == 0 { return 1; }

    round.divide(full_res, divisor).max(1)
}


/// One resolution level of a tiled part.
/// Tiles have the same size on every level,
/// so smaller levels contain fewer tiles instead of smaller tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileLevel {

    /// The level number in each dimension. Both numbers are equal for mip maps.
    pub level_index: Vec2<usize>,

    /// The actual pixel dimensions of this level.
    pub resolution: Vec2<usize>,

    /// The nominal footprint of one tile of this level,
    /// measured in pixels of the full resolution level.
    pub coverage: Vec2<usize>,

    /// How many tiles are required in each dimension to contain the whole level.
    pub tile_counts: Vec2<usize>,

    /// Index of the first chunk of this level in the offset table.
    pub first_chunk_index: usize,

    /// Number of chunks in the offset table that belong to this level.
    pub chunk_count: usize,
}

/// All levels of a tiled part, in the order their chunks appear in the offset table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TilingInformation {

    /// The tiling parameters these levels were computed from.
    pub tiles: TileDescription,

    /// The resolution of the largest level.
    pub data_size: Vec2<usize>,

    /// Mip maps are listed from large to small.
    /// Rip maps are listed row by row: `y` is the outer loop, `x` the inner loop.
    pub levels: Vec<TileLevel>,

    /// Number of levels along each axis. Both numbers are equal for mip maps.
    pub level_count: Vec2<usize>,

    /// The number of chunks of all levels combined.
    pub chunk_count: usize,
}


impl TilingInformation {

    /// Compute all levels of the specified tiling over an image of the specified size.
    pub fn compute(tiles: TileDescription, data_size: Vec2<usize>) -> Result<Self> {
        tiles.validate()?;

        let round = tiles.rounding_mode;

        let level_count = match tiles.level_mode {
            LevelMode::Singular => Vec2(1, 1),

            LevelMode::MipMap => {
                let count = compute_level_count(round, data_size.width().max(data_size.height()));
                Vec2(count, count)
            },

            LevelMode::RipMap => Vec2(
                compute_level_count(round, data_size.width()),
                compute_level_count(round, data_size.height()),
            ),
        };

        let level_indices: Vec<Vec2<usize>> = match tiles.level_mode {
            LevelMode::Singular => vec![ Vec2(0, 0) ],
            LevelMode::MipMap => (0 .. level_count.x()).map(|level| Vec2(level, level)).collect(),
            LevelMode::RipMap => (0 .. level_count.y())
                .flat_map(|y_level| (0 .. level_count.x()).map(move |x_level| Vec2(x_level, y_level)))
                .collect(),
        };

        let mut levels = Vec::with_capacity(level_indices.len());
        let mut chunk_index = 0_usize;

        for level_index in level_indices {
            let resolution = match tiles.level_mode {
                LevelMode::Singular => data_size,
                _ => Vec2(
                    compute_level_size(round, data_size.width(), level_index.x()),
                    compute_level_size(round, data_size.height(), level_index.y()),
                ),
            };

            let coverage = Vec2(
                scale_by_level(tiles.tile_size.width(), level_index.x()),
                scale_by_level(tiles.tile_size.height(), level_index.y()),
            );

            let tile_counts = Vec2(
                compute_block_count(resolution.width(), tiles.tile_size.width()),
                compute_block_count(resolution.height(), tiles.tile_size.height()),
            );

            let chunk_count = tile_counts.width().checked_mul(tile_counts.height())
                .ok_or_else(|| Error::invalid("tile count"))?;

            levels.push(TileLevel {
                level_index, resolution, coverage, tile_counts,
                first_chunk_index: chunk_index,
                chunk_count,
            });

            chunk_index = chunk_index.checked_add(chunk_count)
                .ok_or_else(|| Error::invalid("tile count"))?;
        }

        Ok(TilingInformation { tiles, data_size, levels, level_count, chunk_count: chunk_index })
    }

    /// The number of chunks of all levels combined.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Look up a level by its level number.
    /// Mip map levels must have equal `x` and `y` numbers.
    pub fn level(&self, level_x: usize, level_y: usize) -> Result<&TileLevel> {
        if level_x >= self.level_count.x() || level_y >= self.level_count.y() {
            return Err(Error::invalid("level index out of range"));
        }

        let index = match self.tiles.level_mode {
            LevelMode::Singular => 0,

            LevelMode::MipMap => {
                if level_x != level_y {
                    return Err(Error::invalid("mip map level indices must be equal in x and y"));
                }

                level_x
            },

            LevelMode::RipMap => level_y * self.level_count.x() + level_x,
        };

        self.levels.get(index).ok_or_else(|| Error::invalid("level index out of range"))
    }

    /// Find the level that contains the chunk with the specified offset table index.
    pub fn level_of_chunk(&self, chunk_index: usize) -> Result<&TileLevel> {
        if chunk_index >= self.chunk_count {
            return Err(Error::invalid("chunk index out of range"));
        }

        // the first level always starts at zero, so the partition point is never zero
        let following = self.levels.partition_point(|level| level.first_chunk_index <= chunk_index);
        self.levels.get(following.wrapping_sub(1)).ok_or_else(|| Error::invalid("chunk index out of range"))
    }

    /// The tile index inside its level of the chunk with the specified offset table index.
    pub fn tile_of_chunk(&self, chunk_index: usize) -> Result<(&TileLevel, Vec2<usize>)> {
        let level = self.level_of_chunk(chunk_index)?;
        let local_index = chunk_index - level.first_chunk_index;
        let columns = level.tile_counts.width();
        Ok((level, Vec2(local_index % columns, local_index / columns)))
    }
}

fn scale_by_level(size: usize, level: usize) -> usize {
    let factor = 1_usize.checked_shl(level as u32).unwrap_or(0);
    if factor == 0 { usize::MAX } else { size.saturating_mul(factor) }
}


/// Remembers the levels of previously seen tiled parts.
/// Parts with equal tiling and resolution share the same computed levels.
/// Pass the same cache to all parts of a file, or keep one per application.
#[derive(Debug, Default)]
pub struct LevelCache {
    levels: Mutex<HashMap<(TileDescription, Vec2<usize>), Arc<TilingInformation>>>,
}

impl LevelCache {

    /// Create an empty cache.
    pub fn new() -> Self { Self::default() }

    /// Return the cached levels, or compute and remember them.
    pub fn get_or_compute(&self, tiles: TileDescription, data_size: Vec2<usize>) -> Result<Arc<TilingInformation>> {
        let key = (tiles, data_size);

        // a panic while holding the lock cannot leave a half-inserted entry
        let mut levels = self.levels.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = levels.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let computed = Arc::new(TilingInformation::compute(tiles, data_size)?);
        levels.insert(key, Arc::clone(&computed));
        Ok(computed)
    }

    /// Number of distinct tilings in this cache.
    pub fn len(&self) -> usize {
        self.levels.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Whether nothing has been computed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
