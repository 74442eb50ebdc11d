use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use time_pressure_analyzer::{
    run_aggregation, AnalysisError, BucketMode, MatePolicy, PlayerEntry, RunConfig, RunReport,
    Runner, Summaries,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate time-pressure moves of each player into per-player CSV files
    Analyze(Options),
    /// Summarize existing per-player CSV files
    Summarize(Options),
    /// Analyze, then summarize
    Run(Options),
}

#[derive(Args)]
struct Options {
    /// TOML run configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Players as `Display Name=username` or a bare username
    #[arg(short, long = "player", value_parser = parse_player)]
    players: Vec<PlayerEntry>,

    /// Bare usernames, same as repeating --player
    #[arg(value_name = "USERNAME")]
    usernames: Vec<String>,

    /// Directory holding `<username><suffix>` PGN files
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Appended to each username to find its PGN file
    #[arg(long)]
    input_suffix: Option<String>,

    /// Directory for per-player and summary CSV files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Parallel players (default: number of cores)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// UCI engine executable
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Engine hash table size in MB
    #[arg(long)]
    hash: Option<u32>,

    /// Engine search threads
    #[arg(long)]
    threads: Option<u32>,

    /// Fixed search depth
    #[arg(short, long)]
    depth: Option<u8>,

    /// Seconds below which a move counts as time pressure
    #[arg(long)]
    threshold: Option<f64>,

    /// Clock both sides start with, in seconds
    #[arg(long)]
    initial_clock: Option<f64>,

    /// Map mate scores to +/- this many centipawns instead of leaving them empty
    #[arg(long, value_name = "CP")]
    mate_saturate: Option<i32>,

    /// |best_score| below which a position is critical
    #[arg(long)]
    critical_threshold: Option<i32>,

    /// Clock below which a move is in the under-5s bucket
    #[arg(long)]
    secondary_threshold: Option<f64>,

    /// Count a move in at most one of the under-5s and critical buckets
    #[arg(long)]
    exclusive_buckets: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

fn parse_player(value: &str) -> Result<PlayerEntry, String> {
    let entry = match value.split_once('=') {
        Some((name, username)) => PlayerEntry::new(name.trim(), username.trim()),
        None => PlayerEntry::from_username(value.trim()),
    };
    if entry.username.is_empty() {
        return Err(format!("missing username in '{value}'"));
    }
    Ok(entry)
}

impl Options {
    fn into_config(self) -> Result<(RunConfig, bool), AnalysisError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_toml_file(path)?,
            None => RunConfig::default(),
        };

        let mut players = self.players;
        players.extend(self.usernames.into_iter().map(PlayerEntry::from_username));
        if !players.is_empty() {
            config.players = players;
        }

        if let Some(dir) = self.input_dir {
            config.input_dir = dir;
        }
        if let Some(suffix) = self.input_suffix {
            config.input_suffix = suffix;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if self.jobs.is_some() {
            config.jobs = self.jobs;
        }

        if let Some(path) = self.engine {
            config.engine = config.engine.with_path(path);
        }
        if let Some(hash) = self.hash {
            config.engine = config.engine.with_hash_mb(hash);
        }
        if let Some(threads) = self.threads {
            config.engine = config.engine.with_threads(threads);
        }

        if let Some(depth) = self.depth {
            config.analysis = config.analysis.with_depth(depth);
        }
        if let Some(seconds) = self.threshold {
            config.analysis = config.analysis.with_pressure_threshold(seconds);
        }
        if let Some(seconds) = self.initial_clock {
            config.analysis = config.analysis.with_initial_clock(seconds);
        }
        if let Some(limit) = self.mate_saturate {
            config.analysis = config.analysis.with_mate_policy(MatePolicy::Saturate(limit));
        }
        config.analysis.validate()?;

        if let Some(cp) = self.critical_threshold {
            config.aggregate.critical_threshold = cp;
        }
        if let Some(seconds) = self.secondary_threshold {
            config.aggregate.secondary_threshold = seconds;
        }
        if self.exclusive_buckets {
            config.aggregate.bucket_mode = BucketMode::Exclusive;
        }

        if config.players.is_empty() {
            return Err(AnalysisError::Configuration(
                "no players given; use --player or a [[players]] table".to_string(),
            ));
        }
        Ok((config, self.quiet))
    }
}

fn create_progress_bar(total: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} players {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn analyze(config: &RunConfig, quiet: bool) -> Result<RunReport, AnalysisError> {
    let progress = create_progress_bar(config.players.len(), quiet);
    let report = Runner::new(config).with_progress(progress).run()?;

    println!(
        "{:<24} {:>7} {:>7} {:>8} {:>8} {:>8} {:>10}",
        "player", "games", "played", "rejected", "plies", "moves", "incomplete"
    );
    for (player, stats) in report.completed() {
        println!(
            "{:<24} {:>7} {:>7} {:>8} {:>8} {:>8} {:>10}",
            player.name,
            stats.games,
            stats.tracked_games,
            stats.rejected_games,
            stats.plies,
            stats.rows,
            stats.incomplete_rows
        );
    }
    for (player, e) in report.failures() {
        error!("{} failed: {}", player.name, e);
    }
    Ok(report)
}

fn summarize(config: &RunConfig) -> Result<Summaries, AnalysisError> {
    let summaries = run_aggregation(config)?;

    println!();
    println!(
        "{:<24} {:>12} {:>12} {:>12} {:>8} {:>8} {:>8}",
        "player", "avg_cp_loss", "avg_rel", "avg_log", "moves", "<5s", "critical"
    );
    for row in &summaries.overall {
        println!(
            "{:<24} {:>12.2} {:>12.4} {:>12.3} {:>8} {:>8} {:>8}",
            row.player,
            row.avg_cp_loss,
            row.avg_rel_loss,
            row.avg_log_norm_loss,
            row.total_moves,
            row.moves_under_5s,
            row.critical_moves
        );
    }
    Ok(summaries)
}

fn execute(command: Command) -> Result<bool, AnalysisError> {
    match command {
        Command::Analyze(options) => {
            let (config, quiet) = options.into_config()?;
            let report = analyze(&config, quiet)?;
            let all_ok = report.failures().next().is_none();
            Ok(all_ok)
        }
        Command::Summarize(options) => {
            let (config, _) = options.into_config()?;
            summarize(&config)?;
            Ok(true)
        }
        Command::Run(options) => {
            let (config, quiet) = options.into_config()?;
            let report = analyze(&config, quiet)?;
            summarize(&config)?;
            info!("Summaries written to {}", config.output_dir.display());
            let all_ok = report.failures().next().is_none();
            Ok(all_ok)
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match execute(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
