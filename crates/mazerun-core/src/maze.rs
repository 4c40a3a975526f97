use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Collision radius of a player, in grid units.
pub const PLAYER_RADIUS: f32 = 0.3;

const WALL: u8 = b'#';
const PATH: u8 = b'.';

/// A cell coordinate in the maze grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub x: u32,
    pub z: u32,
}

/// Immutable 2D grid of path/wall cells. `rows[z]` is a string of `'#'` and
/// `'.'` indexed by `x`, which keeps the JSON representation compact for the
/// `game_start` payload and the snapshot channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maze {
    pub width: u32,
    pub height: u32,
    pub rows: Vec<String>,
}

impl Maze {
    /// True when `(x, z)` is inside the grid and a path cell.
    pub fn is_path(&self, x: i64, z: i64) -> bool {
        if x < 0 || z < 0 || x >= i64::from(self.width) || z >= i64::from(self.height) {
            return false;
        }
        self.rows
            .get(z as usize)
            .and_then(|row| row.as_bytes().get(x as usize))
            .is_some_and(|&c| c == PATH)
    }

    pub fn is_wall(&self, x: i64, z: i64) -> bool {
        !self.is_path(x, z)
    }
}

/// Generator output: the grid plus the coordinate lists a room attaches at
/// game start.
#[derive(Debug, Clone)]
pub struct MazeLayout {
    pub maze: Maze,
    pub treasure_cells: Vec<GridPos>,
    pub spawns: Vec<GridPos>,
}

/// Test a player bounding box against the grid: the center plus the four
/// corners at `radius`, so a diagonal gap between two wall cells cannot be
/// clipped through.
pub fn position_clear(maze: &Maze, x: f32, z: f32, radius: f32) -> bool {
    if !x.is_finite() || !z.is_finite() {
        return false;
    }
    let samples = [
        (0.0, 0.0),
        (-radius, -radius),
        (-radius, radius),
        (radius, -radius),
        (radius, radius),
    ];
    samples.iter().all(|(dx, dz)| {
        let sx = x + dx;
        let sz = z + dz;
        sx >= 0.0 && sz >= 0.0 && maze.is_path(sx.floor() as i64, sz.floor() as i64)
    })
}

/// Normalize a heading in degrees to `[0, 360)`.
pub fn normalize_heading(deg: f32) -> f32 {
    if !deg.is_finite() {
        return 0.0;
    }
    deg.rem_euclid(360.0)
}

/// Generate a maze, treasure cells, and the four spawn cells for a room.
///
/// Deterministic for a given seed. Dimensions are clamped to at least 7 and
/// forced odd so the carver leaves a closed outer ring. Spawns are the four
/// interior corners; treasures land on path cells away from spawns.
pub fn generate(seed: u64, width: u32, height: u32, treasure_count: usize) -> MazeLayout {
    let width = width.max(7) | 1;
    let height = height.max(7) | 1;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut cells = vec![vec![WALL; width as usize]; height as usize];

    // Iterative backtracker over the odd-coordinate lattice. Carving only
    // touches interior cells, so the border stays solid wall.
    let mut stack = vec![(1u32, 1u32)];
    cells[1][1] = PATH;
    while let Some(&(cx, cz)) = stack.last() {
        let mut candidates: Vec<(u32, u32)> = Vec::with_capacity(4);
        for (dx, dz) in [(2i64, 0i64), (-2, 0), (0, 2), (0, -2)] {
            let nx = i64::from(cx) + dx;
            let nz = i64::from(cz) + dz;
            if nx >= 1
                && nz >= 1
                && nx < i64::from(width) - 1
                && nz < i64::from(height) - 1
                && cells[nz as usize][nx as usize] == WALL
            {
                candidates.push((nx as u32, nz as u32));
            }
        }
        if candidates.is_empty() {
            stack.pop();
            continue;
        }
        let (nx, nz) = candidates[rng.random_range(0..candidates.len())];
        let wx = ((cx + nx) / 2) as usize;
        let wz = ((cz + nz) / 2) as usize;
        cells[wz][wx] = PATH;
        cells[nz as usize][nx as usize] = PATH;
        stack.push((nx, nz));
    }

    // Knock a few extra walls through so the maze has loops; a perfect maze
    // funnels every player down the same corridor.
    let extra = (u64::from(width) * u64::from(height) / 40) as usize;
    for _ in 0..extra {
        let x = rng.random_range(1..width - 1) as usize;
        let z = rng.random_range(1..height - 1) as usize;
        if cells[z][x] == WALL
            && ((cells[z][x - 1] == PATH && cells[z][x + 1] == PATH)
                || (cells[z - 1][x] == PATH && cells[z + 1][x] == PATH))
        {
            cells[z][x] = PATH;
        }
    }

    let spawns = vec![
        GridPos { x: 1, z: 1 },
        GridPos {
            x: width - 2,
            z: 1,
        },
        GridPos {
            x: 1,
            z: height - 2,
        },
        GridPos {
            x: width - 2,
            z: height - 2,
        },
    ];

    let mut open: Vec<GridPos> = Vec::new();
    for z in 1..height - 1 {
        for x in 1..width - 1 {
            if cells[z as usize][x as usize] == PATH
                && !spawns
                    .iter()
                    .any(|s| s.x.abs_diff(x) <= 2 && s.z.abs_diff(z) <= 2)
            {
                open.push(GridPos { x, z });
            }
        }
    }
    open.shuffle(&mut rng);
    if open.len() < treasure_count {
        tracing::warn!(
            requested = treasure_count,
            available = open.len(),
            "not enough open cells for requested treasure count"
        );
    }
    let treasure_cells: Vec<GridPos> = open.into_iter().take(treasure_count).collect();

    let maze = Maze {
        width,
        height,
        rows: cells
            .into_iter()
            .map(|row| String::from_utf8(row).unwrap_or_default())
            .collect(),
    };
    tracing::debug!(
        width,
        height,
        treasures = treasure_cells.len(),
        "generated maze"
    );

    MazeLayout {
        maze,
        treasure_cells,
        spawns,
    }
}
