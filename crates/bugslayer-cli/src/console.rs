//! Terminal stand-ins for the speech backend: narration is printed, and
//! every utterance counts as finished once it is on screen.

use bugslayer_core::Narrator;
use tokio::sync::oneshot;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNarrator;

impl Narrator for ConsoleNarrator {
    fn speak(&mut self, text: &str) -> oneshot::Receiver<()> {
        println!("» {text}");
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        rx
    }

    fn cancel_current(&mut self) {}

    fn announce_status(&mut self, text: &str) {
        println!("  {text}");
    }
}
