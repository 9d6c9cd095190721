//! Operator commands over a suite persisted in a local data directory.
use anyhow::{Context, Result, bail};
use cmmi_game::{
    AdminConsole, LeaderboardView, MaturityLevel, ScoreDraft, ScoreRecord, Suite, SuiteConfig,
    level_label,
};
use colored::Colorize;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use crate::storage::FileStorage;

/// Load configuration from `config` (or defaults), then apply `CMMI_*`
/// environment overrides.
pub fn load_config(config: Option<&Path>) -> Result<SuiteConfig> {
    let base = match config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            SuiteConfig::from_json(&json)
                .with_context(|| format!("invalid configuration in {}", path.display()))?
        }
        None => SuiteConfig::default(),
    };
    Ok(base.with_env_overrides()?)
}

pub fn open_suite(data_dir: &Path, config: SuiteConfig) -> Result<Suite> {
    let storage = FileStorage::open(data_dir)?;
    log::debug!("using data directory {}", storage.root().display());
    Ok(Suite::local_only(Rc::new(storage), config))
}

/// Accept a level number (`1`..`5`) or a literal game name.
pub fn resolve_game(arg: &str) -> Result<String> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        bail!("game must not be empty");
    }
    if let Ok(number) = trimmed.parse::<u8>() {
        let level = MaturityLevel::from_number(number)
            .with_context(|| format!("no maturity level {number}; expected 1-5"))?;
        return Ok(level.game().to_string());
    }
    Ok(trimmed.to_string())
}

fn write_record(out: &mut dyn Write, record: &ScoreRecord) -> Result<()> {
    writeln!(
        out,
        "{}  {:<20} {:<32} {:>3}/{:<3} {:>3}%  {:>4}s  {}",
        record.date.format("%Y-%m-%d %H:%M"),
        record.player_name,
        record.game_name,
        record.score,
        record.max_score,
        record.percentage,
        record.time_spent,
        record.id.dimmed()
    )?;
    Ok(())
}

pub async fn register(suite: &Suite, out: &mut dyn Write, name: &str) -> Result<()> {
    let identity = suite.identities().register(name).await?;
    writeln!(
        out,
        "Playing as {} (since {})",
        identity.player_name.bold(),
        identity.created_at.format("%Y-%m-%d")
    )?;
    Ok(())
}

pub async fn record(
    suite: &Suite,
    out: &mut dyn Write,
    player: Option<&str>,
    game: &str,
    score: u32,
    max_score: u32,
    time_spent: u32,
) -> Result<()> {
    let game = resolve_game(game)?;
    if suite.is_locked(&game, player).await {
        log::warn!("{game} is still locked for this player; recording anyway");
    }
    let stored = match player {
        Some(name) => {
            let draft = ScoreDraft::new(name, &game, score, max_score).with_time_spent(time_spent);
            suite.scores().record(draft).await?
        }
        None => {
            suite
                .record_for_current_player(&game, score, max_score, time_spent)
                .await?
        }
    };
    write!(out, "Recorded ")?;
    write_record(out, &stored)?;
    Ok(())
}

pub async fn list(
    suite: &Suite,
    out: &mut dyn Write,
    game: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let game = game.map(resolve_game).transpose()?;
    let scores = suite.scores().list().await;
    let mut shown = 0;
    for record in scores
        .iter()
        .filter(|r| game.as_deref().is_none_or(|g| r.game_name == g))
        .take(limit.unwrap_or(usize::MAX))
    {
        write_record(out, record)?;
        shown += 1;
    }
    if shown == 0 {
        writeln!(out, "No scores recorded.")?;
    }
    Ok(())
}

pub async fn top(
    suite: &Suite,
    out: &mut dyn Write,
    game: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let limit = limit.unwrap_or(suite.config().leaderboard_size);
    if let Some(game) = game {
        let game = resolve_game(game)?;
        writeln!(out, "{}", game.bold())?;
        for (rank, record) in suite.top_n(limit, Some(&game)).await.iter().enumerate() {
            write!(out, "{:>2}. ", rank + 1)?;
            write_record(out, record)?;
        }
        return Ok(());
    }

    let scores = suite.scores().list().await;
    let view = LeaderboardView::compute(&scores, limit);
    for (level, records) in &view.per_level {
        writeln!(out, "{}", level_label(level.number()).bold())?;
        if records.is_empty() {
            writeln!(out, "    no attempts yet")?;
        }
        for (rank, record) in records.iter().enumerate() {
            write!(out, "{:>2}. ", rank + 1)?;
            write_record(out, record)?;
        }
    }
    Ok(())
}

pub async fn ranking(suite: &Suite, out: &mut dyn Write) -> Result<()> {
    let ranking = suite.overall_ranking().await;
    if ranking.is_empty() {
        writeln!(out, "No players ranked yet.")?;
        return Ok(());
    }
    writeln!(
        out,
        "{:>4}  {:<20} {:>8} {:>6} {:>8}",
        "Rank", "Player", "Total", "Games", "Average"
    )?;
    for (index, player) in ranking.iter().enumerate() {
        writeln!(
            out,
            "{:>4}  {:<20} {:>8} {:>6} {:>7}%",
            index + 1,
            player.player_name,
            player.total_score,
            player.games_played,
            player.average_percentage
        )?;
    }
    Ok(())
}

pub async fn progress(suite: &Suite, out: &mut dyn Write, player: Option<&str>) -> Result<()> {
    let name = player.map_or_else(|| suite.identities().current_name(), str::to_string);
    if name.trim().is_empty() {
        bail!("no player given and no active player registered");
    }
    let report = suite.progress_report(&name).await;
    writeln!(
        out,
        "{}: {} ({}% mastered)",
        report.player_name.bold(),
        report.level_label,
        report.mastery_percent
    )?;
    for level in &report.levels {
        let state = if level.locked {
            "locked".red()
        } else if level.mastered {
            "mastered".green()
        } else if level.attempts > 0 {
            "attempted".yellow()
        } else {
            "open".normal()
        };
        let best = level
            .best_percentage
            .map_or_else(|| "-".to_string(), |p| format!("{p}%"));
        writeln!(
            out,
            "  {:<28} {:<10} attempts {:>3}  best {best}",
            level_label(level.level.number()),
            state,
            level.attempts
        )?;
    }
    Ok(())
}

pub async fn clear(
    suite: &Suite,
    out: &mut dyn Write,
    secret: &str,
    identities: bool,
) -> Result<()> {
    let mut admin: AdminConsole = suite.admin_console();
    admin.authenticate(secret)?;
    let snapshot = admin.load().await?;
    admin.clear_scores().await?;
    writeln!(out, "Cleared {} scores.", snapshot.scores.len())?;
    if identities {
        suite.identities().clear_identities().await?;
        writeln!(out, "Cleared player identities.")?;
    }
    admin.sign_out();
    Ok(())
}

/// Print the score count on every change, polling the data directory for
/// writes from other processes. Stops after `ticks` polls when given.
pub async fn watch(suite: &Suite, ticks: Option<u64>) -> Result<()> {
    let _subscription = suite
        .scores()
        .subscribe(|scores| {
            let latest = scores
                .first()
                .map(|r| format!(" latest: {} on {} ({}%)", r.player_name, r.game_name, r.percentage))
                .unwrap_or_default();
            println!("{} {} scores{latest}", "●".cyan(), scores.len());
        })
        .await;

    let interval = suite.config().poll_interval();
    let mut polls = 0;
    while ticks.is_none_or(|limit| polls < limit) {
        tokio::time::sleep(interval).await;
        if suite.scores().poll().await {
            log::debug!("data directory changed after {polls} polls");
        }
        polls += 1;
    }
    Ok(())
}
