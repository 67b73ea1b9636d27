use crate::types::{Cell, DiscCount, Player, Position};

pub const STANDARD_SIZE: u8 = 8;
pub const MIN_SIZE: u8 = 4;
pub const MAX_SIZE: u8 = 12;
const DIRECTIONS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Square Reversi board of variable size with optional blocked squares.
///
/// `ignore_occlusion` travels with the board so that copies handed to
/// strategies scan capture lines exactly like the live board does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    size: u8,
    cells: Vec<Cell>,
    ignore_occlusion: bool,
}

impl Board {
    /// Creates an empty board. `size` is clamped to `MIN_SIZE..=MAX_SIZE`.
    pub fn empty(size: u8) -> Self {
        let size = size.clamp(MIN_SIZE, MAX_SIZE);
        Self {
            size,
            cells: vec![Cell::Empty; usize::from(size) * usize::from(size)],
            ignore_occlusion: false,
        }
    }

    /// Creates the standard initial 8x8 board:
    /// d4=white, e4=black, d5=black, e5=white.
    pub fn new() -> Self {
        let mut board = Self::empty(STANDARD_SIZE);
        board.set(3, 3, Cell::White);
        board.set(3, 4, Cell::Black);
        board.set(4, 3, Cell::Black);
        board.set(4, 4, Cell::White);
        board
    }

    /// Builds a board from row-major cell codes. Returns `None` when the
    /// length is not a square of an allowed size or a code is unknown.
    pub fn from_codes(codes: &[u8]) -> Option<Self> {
        let size = (1..=MAX_SIZE).find(|&n| usize::from(n) * usize::from(n) == codes.len())?;
        if size < MIN_SIZE {
            return None;
        }
        let cells = codes
            .iter()
            .map(|&code| Cell::from_code(code))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            size,
            cells,
            ignore_occlusion: false,
        })
    }

    pub fn with_ignore_occlusion(mut self, ignore_occlusion: bool) -> Self {
        self.ignore_occlusion = ignore_occlusion;
        self
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn ignores_occlusion(&self) -> bool {
        self.ignore_occlusion
    }

    pub fn cell(&self, row: u8, col: u8) -> Option<Cell> {
        self.index(i32::from(row), i32::from(col))
            .map(|idx| self.cells[idx])
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Overwrites one square. Out-of-range coordinates are ignored.
    pub fn set(&mut self, row: u8, col: u8, cell: Cell) {
        if let Some(idx) = self.index(i32::from(row), i32::from(col)) {
            self.cells[idx] = cell;
        }
    }

    pub fn is_legal_move(&self, player: Player, row: u8, col: u8) -> bool {
        !self.collect_flips(player, row, col).is_empty()
    }

    /// Returns legal moves in row-major order (top-left to bottom-right).
    pub fn legal_moves(&self, player: Player) -> Vec<Position> {
        let mut legal = Vec::new();
        for row in 0..self.size {
            for col in 0..self.size {
                if self.is_legal_move(player, row, col) {
                    legal.push(Position::new(row, col));
                }
            }
        }
        legal
    }

    pub fn has_legal_move(&self, player: Player) -> bool {
        (0..self.size).any(|row| (0..self.size).any(|col| self.is_legal_move(player, row, col)))
    }

    /// Places one disc and flips captured discs.
    /// Returns the flipped squares. Returns an empty list and leaves the
    /// board untouched when the move is illegal.
    pub fn place(&mut self, player: Player, row: u8, col: u8) -> Vec<Position> {
        let flips = self.collect_flips(player, row, col);
        if flips.is_empty() {
            return flips;
        }

        let own = Cell::from(player);
        self.set(row, col, own);
        for pos in &flips {
            self.set(pos.row, pos.col, own);
        }
        flips
    }

    /// Simulates a move on a copy. Returns `(next_board, flipped_count)`,
    /// or `None` when the move is illegal.
    pub fn apply_move(&self, player: Player, row: u8, col: u8) -> Option<(Board, usize)> {
        let mut next = self.clone();
        let flipped = next.place(player, row, col).len();
        (flipped > 0).then_some((next, flipped))
    }

    pub fn count(&self) -> DiscCount {
        let mut count = DiscCount::default();
        for cell in &self.cells {
            match cell {
                Cell::Black => count.black += 1,
                Cell::White => count.white += 1,
                Cell::Empty | Cell::Blocked => {}
            }
        }
        count
    }

    pub fn empty_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == Cell::Empty).count()
    }

    /// Picks the side to move after `current` has moved.
    /// With `fewer_pieces_continue`, the side with strictly fewer discs
    /// moves next; ties alternate.
    pub fn next_player(&self, current: Player, fewer_pieces_continue: bool) -> Player {
        if !fewer_pieces_continue {
            return current.opponent();
        }
        let count = self.count();
        let mine = count.of(current);
        let theirs = count.of(current.opponent());
        if mine < theirs {
            current
        } else {
            current.opponent()
        }
    }

    /// Converts every non-blocked square to `winner`'s colour.
    pub fn forfeit_to(&mut self, winner: Player) {
        let own = Cell::from(winner);
        for cell in self.cells.iter_mut() {
            if *cell != Cell::Blocked {
                *cell = own;
            }
        }
    }

    /// Row-major cell codes: 0=empty, 1=black, 2=white, 3=blocked.
    pub fn to_codes(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.code()).collect()
    }

    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.cells
            .chunks(usize::from(self.size))
            .map(|row| row.iter().map(|c| c.code()).collect())
            .collect()
    }

    fn index(&self, row: i32, col: i32) -> Option<usize> {
        let size = i32::from(self.size);
        if (0..size).contains(&row) && (0..size).contains(&col) {
            Some((row * size + col) as usize)
        } else {
            None
        }
    }

    fn collect_flips(&self, player: Player, row: u8, col: u8) -> Vec<Position> {
        let Some(origin) = self.index(i32::from(row), i32::from(col)) else {
            return Vec::new();
        };
        if self.cells[origin] != Cell::Empty {
            return Vec::new();
        }

        let own = Cell::from(player);
        let opp = Cell::from(player.opponent());
        let mut flips = Vec::new();

        for (dr, dc) in DIRECTIONS {
            let mut r = i32::from(row) + dr;
            let mut c = i32::from(col) + dc;
            let mut line = Vec::new();

            while let Some(idx) = self.index(r, c) {
                let cell = self.cells[idx];
                if cell == opp {
                    line.push(Position::new(r as u8, c as u8));
                } else if cell == own {
                    flips.append(&mut line);
                    break;
                } else if cell == Cell::Blocked && self.ignore_occlusion {
                    // transparent: keep scanning past it
                } else {
                    break;
                }

                r += dr;
                c += dc;
            }
        }

        flips
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}
