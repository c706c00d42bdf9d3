//! Terminal host: a tick loop on a current-thread runtime with typed
//! commands read from stdin.

use std::time::Duration;

use bugslayer_core::{
    AdversaryKind, Admission, BossAction, Catalog, Config, Engine, Event, ManualQuiz,
    SqliteLedger, Weapon,
};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::console::ConsoleNarrator;

const TICK_MS: u64 = 50;

const HELP: &str = "\
commands:
  n s e w           move (also up, down, left, right)
  hit               use the selected weapon
  1-7 or a name     select a weapon (fire spray slipper bait cat vote recall)
  buy               buy the adversary off with a petition
  pounce | recall   use a boss weapon directly
  scan              where is it?
  status            full status
  answer N          answer the open question
  skip              dismiss the open question
  adopt [NAME]      adopt a cat; cancel to decline
  pause | resume    stop or restart every countdown
  help | quit";

#[derive(Args)]
pub struct PlayArgs {
    /// Level to play
    #[arg(long, default_value_t = 1)]
    level: u32,
    /// Seed for placement and question selection
    #[arg(long)]
    seed: Option<u64>,
    /// Also print every engine event as a JSON line
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Move(i32, i32),
    Hit,
    Select(Weapon),
    Buy,
    Boss(BossAction),
    Scan,
    Status,
    Answer(usize),
    Skip,
    Adopt(String),
    Cancel,
    Pause,
    Resume,
    Help,
    Quit,
}

fn parse(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let head = words.next()?.to_ascii_lowercase();
    let rest = words.collect::<Vec<_>>().join(" ");
    let command = match head.as_str() {
        "n" | "north" | "up" => Command::Move(0, -1),
        "s" | "south" | "down" => Command::Move(0, 1),
        "e" | "east" | "right" => Command::Move(1, 0),
        "w" | "west" | "left" => Command::Move(-1, 0),
        "hit" | "attack" => Command::Hit,
        "buy" => Command::Buy,
        "pounce" => Command::Boss(BossAction::Cat),
        "recall" if rest.is_empty() => Command::Boss(BossAction::Recall),
        "scan" => Command::Scan,
        "status" => Command::Status,
        "answer" => Command::Answer(rest.trim().parse::<usize>().ok().filter(|n| *n > 0)?),
        "skip" => Command::Skip,
        "adopt" => Command::Adopt(rest),
        "cancel" => Command::Cancel,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => {
            let weapon = match other.parse::<u8>() {
                Ok(slot) => Weapon::from_slot(slot),
                Err(_) => Weapon::parse(other),
            };
            Command::Select(weapon?)
        }
    };
    Some(command)
}

pub fn run(args: PlayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;
    runtime.block_on(play(args))
}

async fn play(args: PlayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let level = config.level_book()?.get(args.level);
    let catalog = Catalog::builtin();
    let quiz = ManualQuiz::new(
        config.question_bank()?,
        catalog.get(AdversaryKind::K4).damage,
    );

    let mut builder = Engine::builder(level)
        .config(config)
        .catalog(catalog)
        .narrator(Box::new(ConsoleNarrator))
        .ledger(Box::new(SqliteLedger::open()?))
        .quiz(Box::new(quiz.clone()));
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    let mut engine = builder.build()?;
    engine.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(TICK_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => engine.tick(),
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                engine.note_user_interaction();
                match parse(&line) {
                    Some(Command::Quit) => break,
                    Some(command) => apply(&mut engine, &quiz, command),
                    None => println!("unknown command; type help"),
                }
            }
        }

        for event in engine.drain_events() {
            report(&event, &quiz, args.json)?;
        }
        if engine.is_over() {
            break;
        }
    }

    println!("{:?}", engine.outcome());
    Ok(())
}

fn apply(engine: &mut Engine, quiz: &ManualQuiz, command: Command) {
    let admission = match command {
        Command::Move(dx, dy) => engine.move_by(dx, dy),
        Command::Hit => engine.attack(),
        Command::Select(weapon) => engine.select_weapon(weapon),
        Command::Buy => engine.buy_concession(),
        Command::Boss(action) => engine.use_boss_weapon(action),
        Command::Scan => engine.scan(),
        Command::Status => engine.announce_status(),
        Command::Answer(choice) => match quiz.answer(choice.saturating_sub(1)) {
            Some(_) => Admission::Accepted,
            None => Admission::Ignored,
        },
        Command::Skip => {
            quiz.dismiss();
            Admission::Accepted
        }
        Command::Adopt(name) => engine.adopt_cat(&name),
        Command::Cancel => engine.cancel_adoption(),
        Command::Pause => {
            engine.pause_for_modal();
            Admission::Accepted
        }
        Command::Resume => {
            engine.resume_from_modal();
            Admission::Accepted
        }
        Command::Help => {
            println!("{HELP}");
            Admission::Accepted
        }
        Command::Quit => Admission::Accepted,
    };
    match admission {
        Admission::Accepted => {}
        Admission::Busy => println!("(busy, try again in a moment)"),
        Admission::Halted => println!("(the session is over)"),
        Admission::Ignored => println!("(nothing to do)"),
    }
}

fn report(event: &Event, quiz: &ManualQuiz, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    }
    if let Event::QuizOpened { .. } = event {
        if let Some(question) = quiz.current() {
            for (i, choice) in question.choices.iter().enumerate() {
                println!("  {}. {choice}", i + 1);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_movement_and_weapons() {
        assert_eq!(parse("n"), Some(Command::Move(0, -1)));
        assert_eq!(parse("  LEFT "), Some(Command::Move(-1, 0)));
        assert_eq!(parse("2"), Some(Command::Select(Weapon::Spray)));
        assert_eq!(parse("bait"), Some(Command::Select(Weapon::Bait)));
        assert_eq!(parse("recall"), Some(Command::Boss(BossAction::Recall)));
        assert_eq!(parse("9"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn test_parse_dialog_commands() {
        assert_eq!(parse("answer 3"), Some(Command::Answer(3)));
        assert_eq!(parse("answer x"), None);
        assert_eq!(parse("answer 0"), None);
        assert_eq!(parse("answer 1"), Some(Command::Answer(1)));
        assert_eq!(parse("adopt Tama Cat"), Some(Command::Adopt("Tama Cat".into())));
        assert_eq!(parse("adopt"), Some(Command::Adopt(String::new())));
        assert_eq!(parse("quit"), Some(Command::Quit));
    }
}
