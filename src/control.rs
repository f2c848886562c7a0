//! Line commands accepted on stdin while the daemon runs

use std::str::FromStr;
use thiserror::Error;

use crate::routines::PageKind;
use crate::schedule::{Interval, IntervalError, parse_interval};

pub const HELP: &str = "\
Commands:
  start                          resume auto-refresh
  stop                           pause auto-refresh
  run | now                      refresh the current page now
  fullscreen                     put the report into full-screen
  interval <kind> <duration>     set a refresh interval (kind: semantic-model | report; duration: 90, 90s, 30m, 1h)
  interval full-screen <duration>  set how often a report is put back into full-screen
  toggle                         show or hide the countdown status line
  status                         print the countdown status
  help                           show this list
  quit                           stop the daemon";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    RunNow,
    FullScreen,
    SetInterval { kind: PageKind, interval: Interval },
    SetFullScreenInterval(Interval),
    ToggleIndicator,
    Status,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}', type 'help' for the list")]
    Unknown(String),

    #[error("usage: interval <semantic-model|report|full-screen> <duration>")]
    IntervalUsage,

    #[error("{0}")]
    Kind(String),

    #[error(transparent)]
    Interval(#[from] IntervalError),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(CommandError::Empty);
        };

        let command = match head.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "run" | "now" | "refresh" => Command::RunNow,
            "fullscreen" | "full-screen" => Command::FullScreen,
            "toggle" => Command::ToggleIndicator,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "interval" => {
                let (Some(kind), Some(duration), None) = (words.next(), words.next(), words.next())
                else {
                    return Err(CommandError::IntervalUsage);
                };
                let interval = parse_interval(duration)?;
                if matches!(kind.to_ascii_lowercase().as_str(), "full-screen" | "fullscreen") {
                    return Ok(Command::SetFullScreenInterval(interval));
                }
                let kind = kind.parse::<PageKind>().map_err(CommandError::Kind)?;
                return Ok(Command::SetInterval { kind, interval });
            }
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        match words.next() {
            None => Ok(command),
            Some(_) => Err(CommandError::Unknown(line.trim().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands_case_insensitively() {
        assert_eq!("START".parse::<Command>(), Ok(Command::Start));
        assert_eq!(" stop ".parse::<Command>(), Ok(Command::Stop));
        assert_eq!("now".parse::<Command>(), Ok(Command::RunNow));
        assert_eq!("run".parse::<Command>(), Ok(Command::RunNow));
        assert_eq!("Toggle".parse::<Command>(), Ok(Command::ToggleIndicator));
        assert_eq!("quit".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn parses_interval_command() {
        assert_eq!(
            "interval report 15m".parse::<Command>(),
            Ok(Command::SetInterval {
                kind: PageKind::Report,
                interval: Interval::from_secs(900).unwrap(),
            })
        );
        assert_eq!(
            "interval semantic-model 1h".parse::<Command>().map(|c| match c {
                Command::SetInterval { interval, .. } => interval.as_secs(),
                _ => 0,
            }),
            Ok(3600)
        );
        assert_eq!(
            "interval full-screen 2h".parse::<Command>(),
            Ok(Command::SetFullScreenInterval(Interval::from_secs(7200).unwrap()))
        );
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!("".parse::<Command>(), Err(CommandError::Empty));
        assert_eq!("interval report".parse::<Command>(), Err(CommandError::IntervalUsage));
        assert_eq!(
            "interval report 0".parse::<Command>(),
            Err(CommandError::Interval(IntervalError::TooShort))
        );
        assert!(matches!("interval home 5m".parse::<Command>(), Err(CommandError::Kind(_))));
        assert!(matches!("reboot".parse::<Command>(), Err(CommandError::Unknown(_))));
        assert!(matches!("stop now".parse::<Command>(), Err(CommandError::Unknown(_))));
    }
}
