use clap::Subcommand;
use bugslayer_core::{LedgerStore, Player, SqliteLedger, Weapon};

#[derive(Subcommand)]
pub enum LedgerAction {
    /// Show the saved player
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget the saved player and starter-pack flags
    Reset {
        /// Only clear the vote ledger
        #[arg(long)]
        votes: bool,
    },
}

pub fn run(action: LedgerAction) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = SqliteLedger::open()?;
    match action {
        LedgerAction::Show { json } => {
            let player = ledger.load_player()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&player)?);
                return Ok(());
            }
            match player {
                Some(player) => print_player(&player),
                None => println!("no saved player"),
            }
        }
        LedgerAction::Reset { votes: true } => {
            if ledger.reset_votes()? {
                println!("votes reset");
            } else {
                println!("no saved player");
            }
        }
        LedgerAction::Reset { votes: false } => {
            ledger.reset_player()?;
            println!("player reset");
        }
    }
    Ok(())
}

fn print_player(player: &Player) {
    println!("name:   {}", player.name);
    println!("health: {}", player.hp);
    println!("coins:  {}", player.coins);
    for weapon in Weapon::AMMO {
        println!("{:<8}{}", format!("{weapon}:"), player.ammo(weapon));
    }
    println!("votes:  {}", player.votes);
    for (kind, n) in &player.vote_bought {
        println!("  bought {kind}: {n}");
    }
}
