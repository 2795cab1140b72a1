/// One line typed by the reviewer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Approve,
    /// Reject, optionally replacing the review text with instructions.
    Reject(Option<String>),
    /// Replace the review text.
    Edit(String),
    Yes,
    No,
    Show,
    Restart,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let text = (!rest.is_empty()).then(|| rest.to_string());
        match word.to_ascii_lowercase().as_str() {
            "approve" | "a" => Self::Approve,
            "reject" | "r" => Self::Reject(text),
            "edit" | "e" => Self::Edit(text.unwrap_or_default()),
            "y" | "yes" => Self::Yes,
            "n" | "no" => Self::No,
            "show" | "s" => Self::Show,
            "restart" => Self::Restart,
            "help" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

pub const HELP: &str = "\
commands:
  approve            approve the draft as shown
  reject [text]      reject, sending text (or the current review text) as instructions
  edit <text>        replace the review text
  yes / no           confirm or cancel the selected decision
  show               print the current state
  restart            reopen the session stream
  quit               leave";
