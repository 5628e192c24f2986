//! Line-oriented command language of the console.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Record,
    Email,
    Sensitivity(u32),
    MinArea(u32),
    Threshold(u32),
    Status,
    Snapshot(PathBuf),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  start               start detection
  stop                stop detection (saves an active recording first)
  record              start or stop recording
  email               enable or disable email alerts
  sensitivity <n>     background history, 100-1000
  min-area <n>        smallest motion area in pixels, 100-2000
  threshold <n>       binarization threshold, 50-250
  status              show status and parameters
  snapshot <path>     save the latest annotated frame
  help                show this text
  quit                stop everything and exit";

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(String::new());
    };
    let argument = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments for `{verb}`"));
    }

    let number = |name: &str| -> Result<u32, String> {
        let raw = argument.ok_or_else(|| format!("`{name}` needs a value"))?;
        raw.parse().map_err(|_| format!("`{raw}` is not a number"))
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "record" | "rec" => Command::Record,
        "email" => Command::Email,
        "sensitivity" => Command::Sensitivity(number("sensitivity")?),
        "min-area" | "min_area" | "area" => Command::MinArea(number("min-area")?),
        "threshold" => Command::Threshold(number("threshold")?),
        "status" => Command::Status,
        "snapshot" => {
            let path = argument.ok_or_else(|| "`snapshot` needs a file path".to_string())?;
            Command::Snapshot(PathBuf::from(path))
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command `{other}`, try `help`")),
    };

    let takes_argument = matches!(
        command,
        Command::Sensitivity(_) | Command::MinArea(_) | Command::Threshold(_) | Command::Snapshot(_)
    );
    if argument.is_some() && !takes_argument {
        return Err(format!("`{verb}` takes no arguments"));
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command() {
        assert_eq!(parse_command("start"), Ok(Command::Start));
        assert_eq!(parse_command("  STOP "), Ok(Command::Stop));
        assert_eq!(parse_command("record"), Ok(Command::Record));
        assert_eq!(parse_command("email"), Ok(Command::Email));
        assert_eq!(parse_command("sensitivity 750"), Ok(Command::Sensitivity(750)));
        assert_eq!(parse_command("min-area 900"), Ok(Command::MinArea(900)));
        assert_eq!(parse_command("threshold 120"), Ok(Command::Threshold(120)));
        assert_eq!(parse_command("status"), Ok(Command::Status));
        assert_eq!(parse_command("snapshot out.png"), Ok(Command::Snapshot(PathBuf::from("out.png"))));
        assert_eq!(parse_command("quit"), Ok(Command::Quit));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_command("").is_err());
        assert!(parse_command("threshold").is_err());
        assert!(parse_command("threshold high").is_err());
        assert!(parse_command("start now").is_err());
        assert!(parse_command("sensitivity 1 2").is_err());
        assert!(parse_command("dance").is_err());
    }
}
