//! REPL input parsing.

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(String),
    Edit { index: usize, text: String },
    Regenerate { index: usize },
    History,
    Reset,
    Help,
    Quit,
}

pub const HELP: &str = "Commands:
  <text>             send a message (paste a JSON image payload or a data:image URL to ask about an image)
  /edit <i> <text>   replace message i and answer again
  /regen <i>         regenerate the reply at index i
  /history           show the conversation with indices
  /reset             clear the conversation
  /help              show this help
  /quit              exit";

fn index_arg(command: &str, raw: Option<&str>) -> Result<usize, String> {
    let raw = raw.ok_or_else(|| format!("{} needs a message index", command))?;
    raw.parse()
        .map_err(|_| format!("'{}' is not a message index", raw))
}

/// `Ok(None)` for blank input.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(Command::Send(line.to_string())));
    }

    let mut parts = line.splitn(3, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let command = match command {
        "/edit" => {
            let index = index_arg(command, parts.next())?;
            let text = parts.next().map(str::trim).unwrap_or_default();
            if text.is_empty() {
                return Err("/edit needs the new message text".into());
            }
            Command::Edit {
                index,
                text: text.to_string(),
            }
        }
        "/regen" | "/regenerate" => Command::Regenerate {
            index: index_arg(command, parts.next())?,
        },
        "/history" => Command::History,
        "/reset" => Command::Reset,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(format!("Unknown command {} (try /help)", other)),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_send() {
        assert_eq!(parse("  hello there ").unwrap(), Some(Command::Send("hello there".into())));
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_edit() {
        assert_eq!(
            parse("/edit 2 what about  tomorrow?").unwrap(),
            Some(Command::Edit {
                index: 2,
                text: "what about  tomorrow?".into()
            })
        );
        assert!(parse("/edit 2").is_err());
        assert!(parse("/edit two text").is_err());
    }

    #[test]
    fn test_regen_and_misc() {
        assert_eq!(parse("/regen 3").unwrap(), Some(Command::Regenerate { index: 3 }));
        assert!(parse("/regen").is_err());
        assert_eq!(parse("/quit").unwrap(), Some(Command::Quit));
        assert!(parse("/frobnicate").unwrap_err().contains("Unknown command"));
    }
}
