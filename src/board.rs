//! Board geometry, move legality and terminal-state detection.
//!
//! Row `0` is the top of the board; gravity pulls tokens toward the highest
//! row index, mirroring how the stored JSON board is read top-to-bottom.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::side::Side;
use crate::vector::Vector;

pub const WIDTH: usize = 7;
pub const HEIGHT: usize = 7;
pub const WIN_LENGTH: i32 = 4;

const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("column {0} is full")]
    ColumnFull(usize),
    #[error("column {0} is out of bounds for a board of width {1}")]
    OutOfBounds(i64, usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: Vec<Vec<Option<Side>>>,
}

impl Board {
    pub fn empty() -> Self {
        Self::empty_sized(WIDTH, HEIGHT)
    }

    pub fn empty_sized(width: usize, height: usize) -> Self {
        Self { cells: vec![vec![None; width]; height] }
    }

    pub fn width(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Side> {
        self.cells[row][col]
    }

    pub fn rows(&self) -> &[Vec<Option<Side>>] {
        &self.cells
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|row| row.iter().all(Option::is_some))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub board: Board,
    pub next_side: Side,
}

impl State {
    pub fn new() -> Self {
        Self { board: Board::empty(), next_side: Side::Blue }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

pub fn column_full(state: &State, col: usize) -> bool {
    state.board.cells[0][col].is_some()
}

/// Places `side` (defaulting to `state.next_side`) at the lowest empty cell
/// of `col` and advances `next_side`. Leaves `state` untouched on error.
pub fn drop_token(state: &mut State, col: i64, side: Option<Side>) -> Result<(), BoardError> {
    let width = state.board.width();
    let col: usize = col
        .try_into()
        .ok()
        .filter(|&c: &usize| c < width)
        .ok_or(BoardError::OutOfBounds(col, width))?;

    if column_full(state, col) {
        return Err(BoardError::ColumnFull(col));
    }

    let height = state.board.height();
    let mut row = height - 1;
    while state.board.cells[row][col].is_some() {
        row -= 1;
    }
    let placed = side.unwrap_or(state.next_side);
    state.board.cells[row][col] = Some(placed);
    state.next_side = state.next_side.other();
    Ok(())
}

/// Sides with at least one straight run of four or more. A fully filled
/// board always reports both sides, even if one of them also has a line.
pub fn winners(state: &State) -> Vec<Side> {
    if state.board.is_full() {
        return vec![Side::Red, Side::Blue];
    }
    Side::all()
        .into_iter()
        .filter(|&side| !find_all_lines(state, WIN_LENGTH, side).is_empty())
        .collect()
}

/// Every straight run of exactly `length` cells belonging to `side`, scanned
/// across all four directions.
pub fn find_all_lines(state: &State, length: i32, side: Side) -> Vec<Vector> {
    let width = state.board.width() as i32;
    let height = state.board.height() as i32;
    let mut found = Vec::new();

    for &(dx, dy) in &DIRECTIONS {
        let (x_range, y_range) = start_ranges(width, height, dx, dy, length);
        for x in x_range.clone() {
            for y in y_range.clone() {
                let vector = Vector::new(x, y, dx, dy, length);
                if line_belongs_to(state, &vector, side) {
                    found.push(vector);
                }
            }
        }
    }
    found
}

fn start_ranges(
    width: i32,
    height: i32,
    dx: i32,
    dy: i32,
    length: i32,
) -> (std::ops::Range<i32>, std::ops::Range<i32>) {
    let x_range = if dx > 0 { 0..(width - (length - 1) * dx).max(0) } else { 0..width };
    let y_range = match dy {
        d if d > 0 => 0..(height - (length - 1) * d).max(0),
        d if d < 0 => (length - 1)..height,
        _ => 0..height,
    };
    (x_range, y_range)
}

fn line_belongs_to(state: &State, vector: &Vector, side: Side) -> bool {
    if !vector.in_bounds(state.board.width() as i32, state.board.height() as i32) {
        return false;
    }
    vector
        .cells()
        .all(|(x, y)| state.board.get(y as usize, x as usize) == Some(side))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_column(state: &mut State, col: i64, sides: &[Side]) {
        for &side in sides {
            drop_token(state, col, Some(side)).unwrap();
        }
    }

    #[test]
    fn drop_token_fills_from_the_bottom() {
        let mut state = State::new();
        drop_token(&mut state, 3, Some(Side::Blue)).unwrap();
        assert_eq!(state.board.get(HEIGHT - 1, 3), Some(Side::Blue));
        assert_eq!(state.next_side, Side::Red);
    }

    #[test]
    fn drop_token_rejects_out_of_bounds() {
        let mut state = State::new();
        assert_eq!(drop_token(&mut state, -1, None), Err(BoardError::OutOfBounds(-1, WIDTH)));
        assert_eq!(
            drop_token(&mut state, WIDTH as i64, None),
            Err(BoardError::OutOfBounds(WIDTH as i64, WIDTH))
        );
    }

    #[test]
    fn drop_token_rejects_full_column() {
        let mut state = State::new();
        fill_column(&mut state, 0, &[Side::Red; HEIGHT]);
        assert!(column_full(&state, 0));
        assert_eq!(drop_token(&mut state, 0, Some(Side::Blue)), Err(BoardError::ColumnFull(0)));
    }

    #[test]
    fn single_red_win_seed_scenario() {
        // Column 1 ends up [RED, RED, RED, RED, RED, RED, BLUE] top-to-bottom.
        let mut state = State::new();
        for _ in 0..6 {
            drop_token(&mut state, 1, Some(Side::Red)).unwrap();
        }
        drop_token(&mut state, 1, Some(Side::Blue)).unwrap();
        for _ in 0..4 {
            drop_token(&mut state, 2, Some(Side::Blue)).unwrap();
        }
        for _ in 0..2 {
            drop_token(&mut state, 6, Some(Side::Blue)).unwrap();
        }
        assert_eq!(winners(&state), vec![Side::Red]);
    }

    #[test]
    fn tie_on_full_board_wins_over_a_four_in_a_row() {
        let mut state = State::new();
        for row in 0..HEIGHT {
            for col in 0..WIDTH {
                let side = if (row + col) % 2 == 0 { Side::Red } else { Side::Blue };
                state.board.cells[row][col] = Some(side);
            }
        }
        // Force a red horizontal four despite the checkerboard pattern.
        for col in 0..4 {
            state.board.cells[0][col] = Some(Side::Red);
        }
        assert_eq!(state.board.is_full(), true);
        let mut result = winners(&state);
        result.sort_by_key(|s| u8::from(*s));
        assert_eq!(result, vec![Side::Red, Side::Blue]);
    }

    #[test]
    fn find_all_lines_scans_all_four_directions() {
        let mut state = State::new();
        for col in 0..4 {
            drop_token(&mut state, col, Some(Side::Blue)).unwrap();
        }
        let lines = find_all_lines(&state, WIN_LENGTH, Side::Blue);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].dx, 1);
        assert_eq!(lines[0].dy, 0);
    }
}
