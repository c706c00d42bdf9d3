use clap::Subcommand;
use bugslayer_core::Config;

#[derive(Subcommand)]
pub enum LevelsAction {
    /// List every level
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one level in full
    Show {
        /// Level id
        id: u32,
    },
}

pub fn run(action: LevelsAction) -> Result<(), Box<dyn std::error::Error>> {
    let book = Config::load()?.level_book()?;
    match action {
        LevelsAction::List { json } => {
            let levels: Vec<_> = book.iter().collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&levels)?);
            } else {
                for level in levels {
                    println!("{:>2}  {}  ({})", level.id, level.name, level.targets_text());
                }
            }
        }
        LevelsAction::Show { id } => {
            let Some(level) = book.iter().find(|l| l.id == id) else {
                return Err(format!("unknown level: {id}").into());
            };
            println!("{}", serde_json::to_string_pretty(level)?);
        }
    }
    Ok(())
}
