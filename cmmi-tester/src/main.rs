mod commands;
mod reports;
mod scenarios;
mod simulation;
mod storage;
mod util;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use scenarios::{SCENARIOS, get_scenario, list_scenarios};
use simulation::{ScenarioResult, SimulationRunner};
use util::split_csv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Console,
    Json,
    Markdown,
    Csv,
}

#[derive(Debug, Parser)]
#[command(name = "cmmi-tester", version)]
#[command(about = "Classroom simulations and admin tooling for the CMMI maturity game suite")]
struct Cli {
    /// Directory holding the persisted scores and identities
    #[arg(long, global = true, default_value = ".cmmi-data")]
    data_dir: PathBuf,

    /// Optional JSON configuration file (CMMI_* environment variables still apply)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run seeded classroom scenarios against in-memory storage
    Simulate(SimulateArgs),
    /// Register or resume the active player
    Register {
        #[arg(long)]
        name: String,
    },
    /// Record one game result
    Record {
        /// Level number (1-5) or game name
        #[arg(long)]
        game: String,
        #[arg(long)]
        score: u32,
        #[arg(long)]
        max: u32,
        /// Seconds spent on the game
        #[arg(long, default_value_t = 0)]
        time: u32,
        /// Record for this player instead of the active one
        #[arg(long)]
        player: Option<String>,
    },
    /// Score history, newest first
    List {
        #[arg(long)]
        game: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Per-level top boards, or one game's board with --game
    Top {
        #[arg(long)]
        game: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Overall player ranking
    Ranking,
    /// Progress tracker for a player (defaults to the active one)
    Progress {
        #[arg(long)]
        player: Option<String>,
    },
    /// Delete every score (admin)
    Clear {
        #[arg(long)]
        secret: String,
        /// Also delete player identities
        #[arg(long)]
        identities: bool,
    },
    /// Follow score changes in the data directory
    Watch {
        /// Stop after this many polls
        #[arg(long)]
        ticks: Option<u64>,
    },
}

#[derive(Debug, ClapArgs)]
struct SimulateArgs {
    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Simulated players per classroom
    #[arg(long, default_value_t = 5)]
    players: usize,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Command::Simulate(args) = &cli.command {
        return simulate(args);
    }

    let config = commands::load_config(cli.config.as_deref())?;
    let suite = commands::open_suite(&cli.data_dir, config)?;
    let mut out = stdout();
    match &cli.command {
        Command::Simulate(_) => Ok(()),
        Command::Register { name } => commands::register(&suite, &mut out, name).await,
        Command::Record {
            game,
            score,
            max,
            time,
            player,
        } => {
            commands::record(&suite, &mut out, player.as_deref(), game, *score, *max, *time).await
        }
        Command::List { game, limit } => {
            commands::list(&suite, &mut out, game.as_deref(), *limit).await
        }
        Command::Top { game, limit } => {
            commands::top(&suite, &mut out, game.as_deref(), *limit).await
        }
        Command::Ranking => commands::ranking(&suite, &mut out).await,
        Command::Progress { player } => {
            commands::progress(&suite, &mut out, player.as_deref()).await
        }
        Command::Clear { secret, identities } => {
            commands::clear(&suite, &mut out, secret, *identities).await
        }
        Command::Watch { ticks } => commands::watch(&suite, *ticks).await,
    }
}

fn simulate(args: &SimulateArgs) -> Result<()> {
    if args.list_scenarios {
        let mut output_target = OutputTarget::new(args.output.clone())?;
        writeln!(output_target.writer(), "Available scenarios:")?;
        for (key, description) in list_scenarios() {
            writeln!(output_target.writer(), "  {key:12} - {description}")?;
        }
        output_target.flush_inner()?;
        return Ok(());
    }

    if args.report == ReportFormat::Console {
        announce_banner();
    }

    let start_time = Instant::now();
    let seeds = parse_seeds(&args.seeds)?;
    let runner = SimulationRunner::new(args.players, args.verbose);

    let mut results: Vec<ScenarioResult> = Vec::new();
    for name in expand_scenarios(&args.scenarios) {
        if let Some(scenario) = get_scenario(&name) {
            results.extend(runner.run_scenario(scenario, &seeds));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", name.yellow());
        }
    }

    write_report(args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
    Ok(())
}

fn announce_banner() {
    println!("{}", "🎓 CMMI Suite Tester".bright_cyan().bold());
    println!("{}", "====================".cyan());
}

fn parse_seeds(arg: &str) -> Result<Vec<u64>> {
    split_csv(arg)
        .iter()
        .map(|token| {
            token
                .parse::<u64>()
                .with_context(|| format!("invalid seed {token:?}"))
        })
        .collect()
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for scenario in SCENARIOS {
            if !scenarios.iter().any(|s| s == scenario.key) {
                scenarios.push(scenario.key.to_string());
            }
        }
    }
    scenarios
}

fn write_report(args: &SimulateArgs, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    let out = output_target.writer();
    match args.report {
        ReportFormat::Json => reports::generate_json_report(out, results)?,
        ReportFormat::Markdown => reports::generate_markdown_report(out, results)?,
        ReportFormat::Csv => reports::generate_csv_report(out, results)?,
        ReportFormat::Console => {
            if results.is_empty() {
                writeln!(out, "No scenarios executed.")?;
            } else {
                reports::generate_console_report(out, results, start_time.elapsed())?;
            }
        }
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_expands_to_every_scenario_once() {
        let expanded = expand_scenarios("polling, all");
        assert_eq!(expanded[0], "polling");
        assert_eq!(expanded.len(), SCENARIOS.len());
    }

    #[test]
    fn seeds_must_be_numeric() {
        assert_eq!(parse_seeds("1, 2,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_seeds("1,abc").is_err());
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from([
            "cmmi-tester",
            "--data-dir",
            "/tmp/cmmi",
            "record",
            "--game",
            "2",
            "--score",
            "3",
            "--max",
            "8",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/cmmi"));
        assert!(matches!(
            cli.command,
            Command::Record { score: 3, max: 8, time: 0, .. }
        ));

        let cli = Cli::try_parse_from(["cmmi-tester", "simulate", "--report", "csv"]).unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.report, ReportFormat::Csv);
    }
}
