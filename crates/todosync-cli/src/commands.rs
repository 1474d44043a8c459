//! Line commands read from stdin while the view is live.

use anyhow::{anyhow, bail, Result};

pub const HELP: &str = "\
commands:
  edit <id>             start editing a todo (view holds still)
  title <text>          commit a new title for the todo being edited
  cancel                end the edit without changes
  add <user-id> <text>  create a todo
  rm <id>               delete a todo
  refresh               refresh todos now
  help                  show this text
  quit                  exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Edit(i64),
    Title(String),
    Cancel,
    Add { user_id: i64, title: String },
    Remove(i64),
    Refresh,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb {
            "edit" | "e" => Command::Edit(parse_id(rest)?),
            "title" | "t" => {
                if rest.is_empty() {
                    bail!("title needs some text");
                }
                Command::Title(rest.to_string())
            }
            "cancel" | "c" => Command::Cancel,
            "add" | "a" => {
                let (user, title) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: add <user-id> <text>"))?;
                Command::Add {
                    user_id: parse_id(user)?,
                    title: title.trim().to_string(),
                }
            }
            "rm" | "delete" => Command::Remove(parse_id(rest)?),
            "refresh" | "r" => Command::Refresh,
            "help" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            other => bail!("unknown command {other:?} (try help)"),
        };
        Ok(Some(command))
    }
}

fn parse_id(value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("expected a numeric id, got {value:?}"))
}
