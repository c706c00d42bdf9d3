use clap::Subcommand;
use bugslayer_core::{Config, SqliteLedger};

#[derive(Subcommand)]
pub enum QuizAction {
    /// List the configured question bank
    Bank {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget which questions were already asked
    ResetUsed,
}

pub fn run(action: QuizAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        QuizAction::Bank { json } => {
            let config = Config::load()?;
            let bank = config.question_bank()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&bank)?);
            } else {
                for question in &bank {
                    println!("{}", question.key(&config.quiz.key_prefix));
                    println!("  {}", question.spoken());
                }
            }
        }
        QuizAction::ResetUsed => {
            let cleared = SqliteLedger::open()?.clear_used_question_keys()?;
            println!("cleared {cleared} asked questions");
        }
    }
    Ok(())
}
