use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};
use time_pressure_analyzer::{
    run_aggregation, AnalysisConfig, AnalysisError, EngineOracle, EngineScore, Evaluation,
    PlayerEntry, PlayerOutcome, RunConfig, Runner, UciPosition,
};

/// Scores a position at 20 cp per move played, for the side to move
struct MoveCountEngine;

impl EngineOracle for MoveCountEngine {
    fn evaluate(
        &mut self,
        position: &UciPosition,
        depth: u8,
    ) -> time_pressure_analyzer::Result<Evaluation> {
        Ok(Evaluation {
            score: EngineScore::Centipawns(20 * position.moves().len() as i32),
            depth: Some(depth as u32),
            best_move: None,
        })
    }
}

const ALICE_PGN: &str = r#"[Event "Casual"]
[Site "Local"]
[Date "2024.01.01"]
[White "alice"]
[Black "carol"]
[Result "*"]

1. e4 {[%clk 0:00:09]} e5 {[%clk 0:00:30]} 2. Nf3 {[%clk 0:00:04]} Nc6 {[%clk 0:00:29]} 3. Bb5 {[%clk 0:00:03]} *
"#;

const BOB_PGN: &str = r#"[Site "Local"]
[Date "2024.01.02"]
[White "dave"]
[Black "bob"]

1. d4 {[%clk 0:00:08]} d5 {[%clk 0:xx:08]} *

[Site "Local"]
[Date "2024.01.03"]
[White "dave"]
[Black "bob"]

1. d4 {[%clk 0:00:30]} d5 {[%clk 0:00:08]} 2. c4 {[%clk 0:00:29]} e6 {[%clk 0:00:07]} *
"#;

fn setup() -> (TempDir, RunConfig) {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        input_dir: dir.path().join("pgns"),
        output_dir: dir.path().join("analysis"),
        jobs: Some(2),
        players: vec![
            PlayerEntry::new("Bob", "bob"),
            PlayerEntry::new("Alice", "alice"),
            PlayerEntry::new("Carol", "carol"),
        ],
        analysis: AnalysisConfig::default().with_depth(12),
        ..RunConfig::default()
    };

    fs::create_dir_all(&config.input_dir).unwrap();
    fs::write(config.input_dir.join("alice.pgn"), ALICE_PGN).unwrap();
    fs::write(config.input_dir.join("bob.pgn"), BOB_PGN).unwrap();
    (dir, config)
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_per_player_rows() {
    let (_dir, config) = setup();

    let report = Runner::new(&config).run_with(|_| Ok(MoveCountEngine)).unwrap();
    assert_eq!(report.missing(), 1);
    assert_eq!(report.failures().count(), 0);

    let bob = report
        .completed()
        .find(|(player, _)| player.username == "bob")
        .map(|(_, stats)| stats.clone())
        .unwrap();
    assert_eq!(bob.games, 2);
    assert_eq!(bob.tracked_games, 1);
    assert_eq!(bob.rejected_games, 1);
    assert_eq!(bob.plies, 4);
    assert_eq!(bob.rows, 1);
    assert_eq!(bob.incomplete_rows, 0);

    // Before the move the mover faces 20k, after it the opponent faces 20(k+1)
    assert_eq!(
        read(&config.output_dir.join("alice_time_pressure.csv")),
        "game_id,move_number,player,clock,move,best_score,played_score,engine_depth\n\
         Local-2024.01.01,2,alice,9.0,g1f3,40,-60,12\n\
         Local-2024.01.01,4,alice,4.0,f1b5,80,-100,12\n"
    );
    assert_eq!(
        read(&config.output_dir.join("bob_time_pressure.csv")),
        "game_id,move_number,player,clock,move,best_score,played_score,engine_depth\n\
         Local-2024.01.03,3,bob,8.0,e7e6,60,-80,12\n"
    );
    assert!(!config.output_dir.join("carol_time_pressure.csv").exists());
}

#[test]
fn test_summaries_from_analyzed_files() {
    let (_dir, config) = setup();
    Runner::new(&config).run_with(|_| Ok(MoveCountEngine)).unwrap();

    let summaries = run_aggregation(&config).unwrap();

    // Both average 140 cp; the tie is broken by display name
    let overall: Vec<(&str, f64, usize, usize, usize)> = summaries
        .overall
        .iter()
        .map(|r| (r.player.as_str(), r.avg_cp_loss, r.total_moves, r.moves_under_5s, r.critical_moves))
        .collect();
    assert_eq!(overall, vec![("Alice", 140.0, 2, 1, 2), ("Bob", 140.0, 1, 0, 1)]);
    assert!((summaries.overall[0].avg_rel_loss - (100.0 / 41.0 + 180.0 / 81.0) / 2.0).abs() < 1e-9);

    assert_eq!(summaries.under_5s.len(), 1);
    assert_eq!(summaries.under_5s[0].player, "Alice");
    assert_eq!(summaries.under_5s[0].avg_cp_loss, 180.0);
    assert_eq!(summaries.critical.len(), 2);

    let summary = read(&config.output_dir.join("summary.csv"));
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(
        lines[0],
        "player,avg_cp_loss,avg_rel_loss,avg_log_norm_loss,total_moves,moves_under_5s,critical_moves"
    );
    assert!(lines[1].starts_with("Alice,140.0,") && lines[1].ends_with(",2,1,2"));
    assert!(lines[2].starts_with("Bob,140.0,") && lines[2].ends_with(",1,0,1"));

    let under = read(&config.output_dir.join("summary_under_5s.csv"));
    assert_eq!(under.lines().count(), 2);
    assert!(config.output_dir.join("summary_critical.csv").exists());
}

#[test]
fn test_rerun_is_byte_identical() {
    let (_dir, config) = setup();
    let alice = config.output_dir.join("alice_time_pressure.csv");
    let bob = config.output_dir.join("bob_time_pressure.csv");

    // Leftovers from an earlier run are replaced, not appended to
    fs::create_dir_all(&config.output_dir).unwrap();
    fs::write(&bob, "stale,rows\n").unwrap();

    Runner::new(&config).run_with(|_| Ok(MoveCountEngine)).unwrap();
    run_aggregation(&config).unwrap();
    let first = (read(&alice), read(&bob), read(&config.output_dir.join("summary.csv")));

    Runner::new(&config).run_with(|_| Ok(MoveCountEngine)).unwrap();
    run_aggregation(&config).unwrap();
    let second = (read(&alice), read(&bob), read(&config.output_dir.join("summary.csv")));

    assert_eq!(first, second);
    assert!(!first.1.contains("stale"));
}

#[test]
fn test_engine_failure_keeps_other_players() {
    let (_dir, config) = setup();

    let report = Runner::new(&config)
        .run_with(|player| {
            if player.username == "bob" {
                Err(AnalysisError::Engine("no engine for bob".to_string()))
            } else {
                Ok(MoveCountEngine)
            }
        })
        .unwrap();

    let outcome = report
        .players
        .iter()
        .find(|run| run.player.username == "bob")
        .map(|run| &run.outcome)
        .unwrap();
    assert!(matches!(outcome, PlayerOutcome::Failed(_)));
    assert!(config.output_dir.join("alice_time_pressure.csv").exists());

    let summaries = run_aggregation(&config).unwrap();
    assert_eq!(summaries.overall.len(), 1);
    assert_eq!(summaries.overall[0].player, "Alice");
}

#[test]
fn test_no_data_is_fatal() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        output_dir: dir.path().to_path_buf(),
        players: vec![PlayerEntry::from_username("nobody")],
        ..RunConfig::default()
    };

    let err = run_aggregation(&config).unwrap_err();
    assert!(matches!(err, AnalysisError::NoData));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
