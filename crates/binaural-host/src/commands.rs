//! Runtime commands read from stdin

use std::path::PathBuf;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Move the binaural pair to outputs `start, start + 1`
    Range(usize),
    Enable,
    Bypass,
    /// Load and activate another preset
    Load(PathBuf),
    Restart,
    Stats,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  range <start>   route the mix to outputs start, start+1
  on | off        enable or bypass convolution
  load <path>     activate another HRIR preset
  restart         reopen the audio devices
  stats           print bridge diagnostics
  quit";

impl Command {
    /// Parse a line; `Ok(None)` for blank input
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            return Ok(None);
        };
        let arg = parts.next();

        let command = match (word, arg) {
            ("range", Some(start)) => start
                .parse()
                .map(Command::Range)
                .map_err(|_| format!("invalid channel: {}", start))?,
            ("range", None) => return Err("usage: range <start>".into()),
            ("load", Some(path)) => Command::Load(PathBuf::from(path)),
            ("load", None) => return Err("usage: load <path>".into()),
            ("on", None) => Command::Enable,
            ("off", None) => Command::Bypass,
            ("restart", None) => Command::Restart,
            ("stats", None) => Command::Stats,
            ("help" | "?", None) => Command::Help,
            ("quit" | "exit" | "q", None) => Command::Quit,
            _ => return Err(format!("unknown command: {}", line.trim())),
        };
        Ok(Some(command))
    }
}
