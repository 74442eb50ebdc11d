//! PGN game records.
//!
//! A [`GameCollector`] visits one game at a time, resolves every mainline SAN
//! move against the replayed board and attaches the clock annotation found in
//! the comment that follows it. Games with an illegal move or a malformed
//! clock are rejected as a whole, before any of their plies are analyzed.

use crate::clock::extract_clock;
use crate::errors::{AnalysisError, Result};
use chess::{Board, ChessMove, Color};
use pgn_reader::{BufferedReader, RawComment, RawHeader, SanPlus, Skip, Visitor};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Tag pairs the analysis cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameHeaders {
    pub white: Option<String>,
    pub black: Option<String>,
    pub site: Option<String>,
    pub date: Option<String>,
    /// Custom start position from a `FEN` tag
    pub fen: Option<String>,
}

impl GameHeaders {
    /// Identifier used to group rows: `"{Site}-{Date}"`, empty parts allowed
    pub fn game_id(&self) -> String {
        format!(
            "{}-{}",
            self.site.as_deref().unwrap_or(""),
            self.date.as_deref().unwrap_or("")
        )
    }

    pub fn player(&self, side: Color) -> Option<&str> {
        match side {
            Color::White => self.white.as_deref(),
            Color::Black => self.black.as_deref(),
        }
    }
}

/// One half-move of the mainline
#[derive(Debug, Clone, PartialEq)]
pub struct Ply {
    pub san: String,
    pub chess_move: ChessMove,
    pub mover: Color,
    /// Remaining time of `mover` after this move, from `[%clk ...]`
    pub clock: Option<f64>,
}

/// A fully parsed game
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub headers: GameHeaders,
    pub start: Board,
    pub plies: Vec<Ply>,
}

/// PGN visitor building one [`GameRecord`] per game
pub struct GameCollector {
    headers: GameHeaders,
    board: Board,
    start: Board,
    plies: Vec<Ply>,
    error: Option<AnalysisError>,
}

impl GameCollector {
    pub fn new() -> Self {
        Self {
            headers: GameHeaders::default(),
            board: Board::default(),
            start: Board::default(),
            plies: Vec::new(),
            error: None,
        }
    }

    fn fail(&mut self, error: AnalysisError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

impl Default for GameCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor for GameCollector {
    type Result = Result<GameRecord>;

    fn begin_game(&mut self) {
        self.headers = GameHeaders::default();
        self.board = Board::default();
        self.start = Board::default();
        self.plies.clear();
        self.error = None;
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        let value = value.decode_utf8_lossy().into_owned();
        match key {
            b"White" => self.headers.white = Some(value),
            b"Black" => self.headers.black = Some(value),
            b"Site" => self.headers.site = Some(value),
            b"Date" => self.headers.date = Some(value),
            b"FEN" => self.headers.fen = Some(value),
            _ => {}
        }
    }

    fn end_headers(&mut self) -> Skip {
        if let Some(fen) = self.headers.fen.clone() {
            match Board::from_str(&fen) {
                Ok(board) => {
                    self.board = board;
                    self.start = board;
                }
                Err(e) => {
                    self.fail(AnalysisError::Pgn(format!("invalid FEN '{fen}': {e}")));
                    return Skip(true);
                }
            }
        }
        Skip(false)
    }

    fn san(&mut self, san_plus: SanPlus) {
        if self.error.is_some() {
            return;
        }

        let san = san_plus.san.to_string();
        match ChessMove::from_san(&self.board, &san) {
            Ok(chess_move) if self.board.legal(chess_move) => {
                let mover = self.board.side_to_move();
                self.board = self.board.make_move_new(chess_move);
                self.plies.push(Ply {
                    san,
                    chess_move,
                    mover,
                    clock: None,
                });
            }
            _ => {
                let ply = self.plies.len();
                self.fail(AnalysisError::IllegalMove { san, ply });
            }
        }
    }

    fn comment(&mut self, comment: RawComment<'_>) {
        // A comment before the first move belongs to the game, not a ply
        if self.error.is_some() || self.plies.is_empty() {
            return;
        }

        let text = String::from_utf8_lossy(comment.as_bytes());
        match extract_clock(&text) {
            Ok(Some(seconds)) => {
                if let Some(ply) = self.plies.last_mut() {
                    ply.clock = Some(seconds);
                }
            }
            Ok(None) => {}
            Err(e) => self.fail(e),
        }
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true) // Mainline only
    }

    fn end_game(&mut self) -> Self::Result {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        Ok(GameRecord {
            headers: std::mem::take(&mut self.headers),
            start: self.start,
            plies: std::mem::take(&mut self.plies),
        })
    }
}

/// Iterator over the games of a PGN stream.
///
/// Each item is either a parsed game or the reason it was rejected; reading
/// continues with the next game after a rejection. An I/O failure of the
/// underlying stream ends the iteration.
pub struct PgnGames<R: Read> {
    reader: BufferedReader<R>,
    collector: GameCollector,
    failed: bool,
}

impl<R: Read> PgnGames<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufferedReader::new(source),
            collector: GameCollector::new(),
            failed: false,
        }
    }
}

impl PgnGames<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> Iterator for PgnGames<R> {
    type Item = Result<GameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.read_game(&mut self.collector) {
            Ok(game) => game,
            Err(e) => {
                self.failed = true;
                Some(Err(AnalysisError::Io(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_GAMES: &str = r#"[Event "Live Chess"]
[Site "Chess.com"]
[Date "2024.03.01"]
[White "alice"]
[Black "bob"]
[Result "1-0"]

1. e4 {[%clk 0:02:59.5]} 1... e5 {[%clk 0:02:58]} 2. Nf3 (2. Qh5 {[%clk 0:00:01]}) 2... Nc6 3. Bb5 {[%clk 0:02:50]} 1-0

[Site "Chess.com"]
[Date "2024.03.02"]
[White "bob"]
[Black "alice"]
[Result "0-1"]

1. d4 d5 2. c4 dxc4 0-1
"#;

    fn parse(text: &str) -> Vec<Result<GameRecord>> {
        PgnGames::new(text.as_bytes()).collect()
    }

    #[test]
    fn test_reads_headers_and_clocks() {
        let games = parse(TWO_GAMES);
        assert_eq!(games.len(), 2);

        let game = games[0].as_ref().unwrap();
        assert_eq!(game.headers.white.as_deref(), Some("alice"));
        assert_eq!(game.headers.game_id(), "Chess.com-2024.03.01");
        assert_eq!(game.plies.len(), 5);

        let clocks: Vec<Option<f64>> = game.plies.iter().map(|p| p.clock).collect();
        assert_eq!(clocks, vec![Some(179.5), Some(178.0), None, None, Some(170.0)]);

        let movers: Vec<Color> = game.plies.iter().map(|p| p.mover).collect();
        assert_eq!(
            movers,
            vec![Color::White, Color::Black, Color::White, Color::Black, Color::White]
        );
        assert_eq!(game.plies[4].chess_move.to_string(), "f1b5");

        let second = games[1].as_ref().unwrap();
        assert_eq!(second.headers.player(Color::Black), Some("alice"));
        assert!(second.plies.iter().all(|p| p.clock.is_none()));
    }

    #[test]
    fn test_malformed_clock_rejects_only_that_game() {
        let text = TWO_GAMES.replace("0:02:58]", "0:0x:58]");
        let games = parse(&text);

        assert!(matches!(
            games[0],
            Err(AnalysisError::ClockAnnotation { .. })
        ));
        assert!(games[1].is_ok());
    }

    #[test]
    fn test_illegal_move_rejects_game() {
        let games = parse("[White \"a\"]\n[Black \"b\"]\n\n1. e4 e5 2. Ke3 *\n");
        match &games[0] {
            Err(AnalysisError::IllegalMove { san, ply }) => {
                assert_eq!(san, "Ke3");
                assert_eq!(*ply, 2);
            }
            other => panic!("Expected IllegalMove, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_start_position() {
        let text = "[White \"a\"]\n[Black \"b\"]\n[SetUp \"1\"]\n[FEN \"4k3/8/8/8/8/8/4P3/4K3 b - - 0 1\"]\n\n1... Kd7 2. e4 *\n";
        let games = parse(text);
        let game = games[0].as_ref().unwrap();

        assert_eq!(game.start.side_to_move(), Color::Black);
        assert_eq!(game.plies[0].mover, Color::Black);
        assert_eq!(game.plies[1].mover, Color::White);
    }
}
