//! Placement modes and board geometry.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Cell on the board. Lane levels keep `y` at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementMode {
    Lane,
    #[default]
    Grid,
}

impl PlacementMode {
    /// Same-cell predicate used by every resolution.
    pub fn same_cell(self, a: Cell, b: Cell) -> bool {
        match self {
            PlacementMode::Lane => a.x == b.x,
            PlacementMode::Grid => a == b,
        }
    }
}

/// Inclusive obstacle rectangle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    #[serde(default)]
    pub label: Option<String>,
}

impl Rect {
    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= self.x1 && cell.x <= self.x2 && cell.y >= self.y1 && cell.y <= self.y2
    }
}

/// Outcome of a single move attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Moved(Cell),
    Wall,
    /// Index of the obstacle that blocked the move.
    Obstacle(usize),
}

#[derive(Debug, Clone)]
pub struct Board {
    mode: PlacementMode,
    cols: i32,
    rows: i32,
    obstacles: Vec<Rect>,
}

impl Board {
    pub fn new(mode: PlacementMode, cols: u32, rows: u32, obstacles: Vec<Rect>) -> Self {
        let rows = match mode {
            PlacementMode::Lane => 1,
            PlacementMode::Grid => rows.max(1),
        };
        Self {
            mode,
            cols: cols.max(1) as i32,
            rows: rows as i32,
            obstacles,
        }
    }

    pub fn mode(&self) -> PlacementMode {
        self.mode
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn obstacles(&self) -> &[Rect] {
        &self.obstacles
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.x < self.cols && cell.y >= 0 && cell.y < self.rows
    }

    pub fn obstacle_at(&self, cell: Cell) -> Option<usize> {
        self.obstacles.iter().position(|r| r.contains(cell))
    }

    /// Out of bounds or covered by an obstacle.
    pub fn is_blocked(&self, cell: Cell) -> bool {
        !self.in_bounds(cell) || self.obstacle_at(cell).is_some()
    }

    pub fn step(&self, from: Cell, dx: i32, dy: i32) -> Step {
        let dy = if self.mode == PlacementMode::Lane { 0 } else { dy };
        let to = from.offset(dx, dy);
        if !self.in_bounds(to) {
            return Step::Wall;
        }
        match self.obstacle_at(to) {
            Some(idx) => Step::Obstacle(idx),
            None => Step::Moved(to),
        }
    }

    /// Lane middle, or grid centre moved to the nearest free cell when blocked.
    pub fn start_cell(&self) -> Cell {
        let centre = Cell::new(self.cols / 2, self.rows / 2);
        if self.is_blocked(centre) {
            self.nearest_free_cell(centre)
        } else {
            centre
        }
    }

    /// Breadth-first ring search outward from `origin`. Returns `origin`
    /// when the whole board is blocked.
    pub fn nearest_free_cell(&self, origin: Cell) -> Cell {
        let max_radius = self.cols.max(self.rows);
        for radius in 1..=max_radius {
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    let cell = origin.offset(dx, dy);
                    if !self.is_blocked(cell) {
                        return cell;
                    }
                }
            }
        }
        origin
    }

    pub fn random_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Cell {
        Cell::new(rng.gen_range(0..self.cols), rng.gen_range(0..self.rows))
    }

    /// Up to 100 attempts at a free cell not in `exclude`, then any cell.
    pub fn random_free_cell<R: Rng + ?Sized>(&self, rng: &mut R, exclude: &[Cell]) -> Cell {
        for _ in 0..100 {
            let cell = self.random_cell(rng);
            if !self.is_blocked(cell) && !exclude.contains(&cell) {
                return cell;
            }
        }
        self.random_cell(rng)
    }

    pub fn free_cells_in_row(&self, row: i32) -> usize {
        (0..self.cols)
            .filter(|&x| !self.is_blocked(Cell::new(x, row)))
            .count()
    }

    /// Spoken, 1-based position.
    pub fn describe(&self, cell: Cell) -> String {
        match self.mode {
            PlacementMode::Lane => format!("position {} of {}", cell.x + 1, self.cols),
            PlacementMode::Grid => format!("column {}, row {}", cell.x + 1, cell.y + 1),
        }
    }

    /// Spoken direction from `from` to `to`, e.g. "2 right, 1 up".
    pub fn direction_hint(&self, from: Cell, to: Cell) -> String {
        let mut parts = Vec::new();
        let dx = to.x - from.x;
        if dx != 0 {
            parts.push(format!("{} {}", dx.abs(), if dx > 0 { "right" } else { "left" }));
        }
        if self.mode == PlacementMode::Grid {
            let dy = to.y - from.y;
            if dy != 0 {
                parts.push(format!("{} {}", dy.abs(), if dy > 0 { "down" } else { "up" }));
            }
        }
        if parts.is_empty() {
            "right here".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn living_room() -> Board {
        Board::new(
            PlacementMode::Grid,
            7,
            7,
            vec![
                Rect { x1: 2, y1: 2, x2: 4, y2: 3, label: Some("sofa".into()) },
                Rect { x1: 2, y1: 6, x2: 4, y2: 6, label: Some("tv".into()) },
            ],
        )
    }

    #[test]
    fn lane_same_cell_ignores_row() {
        assert!(PlacementMode::Lane.same_cell(Cell::new(3, 0), Cell::new(3, 2)));
        assert!(!PlacementMode::Grid.same_cell(Cell::new(3, 0), Cell::new(3, 2)));
    }

    #[test]
    fn blocked_centre_moves_to_nearest_free_cell() {
        let board = living_room();
        let start = board.start_cell();
        assert!(!board.is_blocked(start));
        let centre = Cell::new(3, 3);
        assert!(board.is_blocked(centre));
        assert!((start.x - centre.x).abs() <= 1 && (start.y - centre.y).abs() <= 1);
    }

    #[test]
    fn step_reports_walls_and_obstacles() {
        let board = living_room();
        assert_eq!(board.step(Cell::new(0, 0), -1, 0), Step::Wall);
        assert_eq!(board.step(Cell::new(1, 2), 1, 0), Step::Obstacle(0));
        assert_eq!(board.step(Cell::new(1, 1), 1, 0), Step::Moved(Cell::new(2, 1)));
    }

    #[test]
    fn lane_steps_ignore_vertical_component() {
        let board = Board::new(PlacementMode::Lane, 7, 3, Vec::new());
        assert_eq!(board.rows(), 1);
        assert_eq!(board.step(Cell::new(3, 0), 0, 1), Step::Moved(Cell::new(3, 0)));
    }

    #[test]
    fn random_free_cell_avoids_obstacles_and_exclusions() {
        let board = living_room();
        let mut rng = Pcg64::seed_from_u64(7);
        let exclude = [Cell::new(0, 0)];
        for _ in 0..200 {
            let cell = board.random_free_cell(&mut rng, &exclude);
            assert!(!board.is_blocked(cell));
            assert_ne!(cell, Cell::new(0, 0));
        }
    }

    #[test]
    fn direction_hint_reads_naturally() {
        let board = living_room();
        assert_eq!(board.direction_hint(Cell::new(1, 1), Cell::new(3, 0)), "2 right, 1 up");
        assert_eq!(board.direction_hint(Cell::new(1, 1), Cell::new(1, 1)), "right here");
    }
}
