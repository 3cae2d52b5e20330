use crate::companion::{Companion, TurnOutcome};
use crate::config::DATA_DIR_NAME;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Run the init command
pub fn run_init(path: &str) -> Result<(), String> {
    let path = Path::new(path);
    let data_path = path.join(DATA_DIR_NAME);

    if data_path.exists() {
        return Err(format!("{} already exists at {}", DATA_DIR_NAME, data_path.display()));
    }

    let data_path = Companion::init(path)?;
    println!("Initialized {}", data_path.display());
    println!("\nAdd tips with: companion tips add <topic> \"<tip>\"");

    Ok(())
}

/// Run the chat command: one turn, or a loop over stdin
pub fn run_chat(message: Option<&str>, mood: Option<&str>) -> Result<(), String> {
    let companion = Companion::open()?;

    if let Some(m) = message {
        match companion.turn(m, mood) {
            Some(outcome) => print_outcome(&outcome),
            None => println!("Nothing to say? I'm listening whenever you're ready."),
        }
        return Ok(());
    }

    if companion.corpus().is_empty() {
        println!("(No tips loaded - replies only.)");
    }
    println!("How are you feeling today? (type 'quit' to leave)\n");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().map_err(|e| format!("Failed to write prompt: {}", e))?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| format!("Failed to read input: {}", e))?;

        if read == 0 || is_quit(&line) {
            break;
        }

        if let Some(outcome) = companion.turn(&line, mood) {
            print_outcome(&outcome);
        }
    }

    println!("Take care.");
    Ok(())
}

fn is_quit(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "quit" | "exit" | "bye" | "goodbye")
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("\nAI: {}", outcome.output);
    if outcome.tip.is_none() {
        println!("\n(No tip found.)");
    }
    if let Some(warning) = &outcome.log_warning {
        eprintln!("Warning: turn was not logged: {}", warning);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_quit() {
        assert!(is_quit("quit\n"));
        assert!(is_quit("  Goodbye "));
        assert!(!is_quit("I want to quit my job"));
    }
}
