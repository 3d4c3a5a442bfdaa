use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use clap::{Parser, Subcommand, ValueEnum};
use dicetray::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session configuration JSON file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Random seed for reproducibility
    #[arg(long, default_value = None)]
    seed: Option<u64>,

    /// Number of rolls kept in the history
    #[arg(long, default_value = None)]
    capacity: Option<usize>,

    /// Don't print the grand total after a roll
    #[arg(long, default_value_t = false)]
    hide_total: bool,

    /// Print rolls and history as JSON lines
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Roll this once and exit instead of starting a session, e.g. "2d6 d20"
    expression: Option<String>,
}

#[derive(Parser, Debug)]
#[command(multicall = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Roll dice, e.g. `roll 2d6 d20`. With no dice, rolls the current counts.
    Roll { dice: Vec<String> },
    /// Set the count for one die type, e.g. `set d6 3`
    Set { die: String, value: String },
    /// Show the current counts
    Counts,
    /// Show the roll history, newest first
    History,
    /// Roll a history entry's dice again
    Reroll {
        #[arg(allow_negative_numbers = true)]
        index: i64,
    },
    /// Clear the roll history
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// Show or hide the grand total
    Total { state: Switch },
    /// Leave the session
    #[command(alias = "exit")]
    Quit,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::builder()
        .format_timestamp_secs()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    log::debug!("Starting with args: {:?}", args);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            SessionConfig::load(path)?
        }
        None => SessionConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(capacity) = args.capacity {
        config.history_capacity = capacity;
    }
    if args.hide_total {
        config.show_grand_total = false;
    }

    let mut session = DiceSession::new(&config)?;

    if let Some(expression) = &args.expression {
        let counts = parse_roll_expression(expression)?;
        let outcome = session.perform_roll(&counts)?;
        print_outcome(&session, &outcome, args.json)?;
        return Ok(());
    }

    run_session(&mut session, args.json)
}

fn run_session(session: &mut DiceSession, json: bool) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("dicetray> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match Line::try_parse_from(line.split_whitespace()) {
            Ok(Line { command }) => command,
            Err(e) => {
                e.print()?;
                continue;
            }
        };

        match command {
            Command::Roll { dice } => {
                if !dice.is_empty() {
                    match parse_roll_expression(&dice.join(" ")) {
                        Ok(counts) => session.set_counts(counts),
                        Err(e) => {
                            println!("{e}");
                            continue;
                        }
                    }
                }
                let outcome = session.roll()?;
                print_outcome(session, &outcome, json)?;
            }
            Command::Set { die, value } => {
                let die: DieKind = match die.parse() {
                    Ok(die) => die,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                let (count, rewrite) = normalize_field(&value);
                session.counts_mut().set(die, count);
                if let Some(text) = rewrite {
                    println!("{} set to {}", die.id(), text);
                }
            }
            Command::Counts => print_counts(session.counts()),
            Command::History => print_history(session.history(), json)?,
            Command::Reroll { index } => {
                let outcome = match usize::try_from(index) {
                    Ok(index) => session.reroll_from_history(index)?,
                    Err(_) => None,
                };
                match outcome {
                    Some(outcome) => print_outcome(session, &outcome, json)?,
                    None => println!("No roll at history index {index}"),
                }
            }
            Command::Clear { yes } => {
                if yes || confirm(CLEAR_HISTORY_PROMPT, &mut lines)? {
                    session.clear_history();
                }
            }
            Command::Total { state } => {
                session.set_show_grand_total(matches!(state, Switch::On));
            }
            Command::Quit => break,
        }
    }

    Ok(())
}

fn confirm(
    prompt: &str,
    lines: &mut impl Iterator<Item = std::io::Result<String>>,
) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let answer = match lines.next() {
        Some(line) => line?,
        None => return Ok(false),
    };
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_outcome(session: &DiceSession, outcome: &RollOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
        return Ok(());
    }
    let mut buf = String::new();
    outcome.pretty_print(&mut buf, session.show_grand_total())?;
    println!("{buf}");
    Ok(())
}

fn print_counts(counts: &DiceCounts) {
    let line = DieKind::ALL
        .iter()
        .map(|die| format!("{}={}", die.id(), counts.get(*die)))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{line}");
}

fn print_history(history: &History, json: bool) -> anyhow::Result<()> {
    if json {
        for record in history.snapshot() {
            println!("{}", serde_json::to_string(record)?);
        }
        return Ok(());
    }

    if history.is_empty() {
        println!("{NO_HISTORY}");
        return Ok(());
    }

    println!(
        "{} of at most {} rolls, newest first",
        history.len(),
        history.capacity()
    );
    let summaries: Vec<String> = history.snapshot().map(|r| r.summary()).collect();
    let width = summaries.iter().map(|s| columns(s)).max().unwrap_or(0);
    for (index, (record, summary)) in history.snapshot().zip(&summaries).enumerate() {
        println!(
            "[{index:>2}] {}  {}  Total: {}",
            record.local_time(),
            pad_to_columns(summary, width),
            record.grand_total()
        );
        for group in record.results() {
            let mut buf = String::new();
            group.pretty_print(&mut buf)?;
            println!("       {buf}");
        }
    }
    Ok(())
}
