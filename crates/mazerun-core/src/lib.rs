pub mod maze;
pub mod net;
pub mod player;
pub mod room;
pub mod snapshot;
pub mod treasure;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::maze::{GridPos, Maze, MazeLayout};
    use crate::player::{Player, PlayerId};
    use crate::treasure::Treasure;

    /// Create `n` lobby players with sequential IDs starting at 1.
    pub fn make_players(n: usize) -> Vec<Player> {
        (0..n)
            .map(|i| Player::new(i as PlayerId + 1, format!("Player{}", i + 1)))
            .collect()
    }

    /// A fully open maze (walls only on the outer ring) for collision and
    /// reconciliation tests that need predictable geometry.
    pub fn open_maze(width: u32, height: u32) -> Maze {
        let rows = (0..height)
            .map(|z| {
                (0..width)
                    .map(|x| {
                        if x == 0 || z == 0 || x == width - 1 || z == height - 1 {
                            '#'
                        } else {
                            '.'
                        }
                    })
                    .collect()
            })
            .collect();
        Maze {
            width,
            height,
            rows,
        }
    }

    /// An open maze plus `n` treasures along the top path row.
    pub fn open_layout(width: u32, height: u32, n: usize) -> MazeLayout {
        let maze = open_maze(width, height);
        let treasure_cells: Vec<GridPos> = (0..n as u32)
            .map(|i| GridPos {
                x: 1 + i % (width - 2),
                z: 1 + i / (width - 2),
            })
            .collect();
        MazeLayout {
            maze,
            treasure_cells,
            spawns: vec![
                GridPos { x: 1, z: height - 2 },
                GridPos {
                    x: width - 2,
                    z: height - 2,
                },
                GridPos { x: 1, z: height / 2 },
                GridPos {
                    x: width - 2,
                    z: height / 2,
                },
            ],
        }
    }

    /// Build the treasure list a room would attach from a layout.
    pub fn treasures_from(layout: &MazeLayout) -> Vec<Treasure> {
        layout
            .treasure_cells
            .iter()
            .enumerate()
            .map(|(i, cell)| Treasure::new(i, *cell))
            .collect()
    }
}
