//! Line grammar of the emulator console.
//!
//! Keywords match case-insensitively and surrounding whitespace is ignored.
//! Every line must parse completely; trailing input is a syntax error.

use std::fmt;

use winnow::ascii::{Caseless, dec_uint, space0, space1};
use winnow::combinator::{alt, delimited, opt, preceded};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    /// Run `count` full periods (sub-interval, boundary, transmit drain).
    Period { count: u32 },
    /// Drive the light comparator input.
    Light { bright: bool },
    /// Set the raw code returned by every temperature conversion.
    Temp { code: u16 },
    /// Load the sensor's channel-0 count.
    Lux { count: u16 },
    /// Attach or detach the external sensor from the bus.
    Sensor { online: bool },
    /// Raise the sensor's data-ready interrupt.
    Edge,
    Regs,
    Status,
    Help,
    Exit,
}

/// Syntax error with the byte offset where parsing stopped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "unrecognized input at column {}", self.offset + 1)
        } else {
            write!(f, "{} at column {}", self.message, self.offset + 1)
        }
    }
}

impl std::error::Error for CommandError {}

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("period", "period [count]              - run up to 1000 timer periods"),
    ("light", "light <bright|dark>         - set the comparator input"),
    ("temp", "temp <code>                 - set the raw ADC temperature code"),
    ("lux", "lux <count>                 - set the sensor channel-0 count"),
    ("sensor", "sensor <online|offline>     - attach or detach the sensor"),
    ("edge", "edge                        - raise the sensor interrupt"),
    ("regs", "regs                        - dump the sensor registers"),
    ("status", "status                      - show node state"),
    ("help", "help                        - list commands"),
    ("exit", "exit                        - leave the emulator"),
];

/// Parses one console line.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    delimited(space0, command, space0)
        .parse(line)
        .map_err(|err| CommandError {
            offset: err.offset(),
            message: err.inner().to_string(),
        })
}

fn command(input: &mut &str) -> ModalResult<Command> {
    alt((
        period,
        light,
        temp,
        lux,
        sensor,
        Caseless("edge").value(Command::Edge),
        Caseless("regs").value(Command::Regs),
        Caseless("status").value(Command::Status),
        Caseless("help").value(Command::Help),
        alt((Caseless("exit"), Caseless("quit"))).value(Command::Exit),
    ))
    .context(StrContext::Label("command"))
    .parse_next(input)
}

fn period(input: &mut &str) -> ModalResult<Command> {
    preceded(Caseless("period"), opt(preceded(space1, dec_uint)))
        .map(|count: Option<u32>| Command::Period {
            count: count.unwrap_or(1),
        })
        .parse_next(input)
}

fn light(input: &mut &str) -> ModalResult<Command> {
    preceded(
        (Caseless("light"), space1),
        alt((
            Caseless("bright").value(true),
            Caseless("dark").value(false),
        ))
        .context(StrContext::Expected(StrContextValue::StringLiteral("bright"))),
    )
    .map(|bright| Command::Light { bright })
    .parse_next(input)
}

fn temp(input: &mut &str) -> ModalResult<Command> {
    preceded((Caseless("temp"), space1), dec_uint)
        .map(|code| Command::Temp { code })
        .parse_next(input)
}

fn lux(input: &mut &str) -> ModalResult<Command> {
    preceded((Caseless("lux"), space1), dec_uint)
        .map(|count| Command::Lux { count })
        .parse_next(input)
}

fn sensor(input: &mut &str) -> ModalResult<Command> {
    preceded(
        (Caseless("sensor"), space1),
        alt((
            Caseless("online").value(true),
            Caseless("offline").value(false),
        )),
    )
    .map(|online| Command::Sensor { online })
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keywords_case_insensitively() {
        assert_eq!(parse_command("STATUS"), Ok(Command::Status));
        assert_eq!(parse_command("  edge  "), Ok(Command::Edge));
        assert_eq!(parse_command("Quit"), Ok(Command::Exit));
        assert_eq!(
            parse_command("light Dark"),
            Ok(Command::Light { bright: false })
        );
        assert_eq!(
            parse_command("sensor offline"),
            Ok(Command::Sensor { online: false })
        );
    }

    #[test]
    fn period_count_defaults_to_one() {
        assert_eq!(parse_command("period"), Ok(Command::Period { count: 1 }));
        assert_eq!(
            parse_command("period 12"),
            Ok(Command::Period { count: 12 })
        );
    }

    #[test]
    fn numeric_arguments_are_range_checked() {
        assert_eq!(parse_command("temp 1037"), Ok(Command::Temp { code: 1037 }));
        assert_eq!(parse_command("lux 65535"), Ok(Command::Lux { count: 65535 }));
        assert!(parse_command("lux 65536").is_err());
        assert!(parse_command("temp").is_err());
    }

    #[test]
    fn rejects_trailing_input() {
        let err = parse_command("period 3 now").expect_err("trailing word");
        assert_eq!(err.offset, 9);
        assert!(parse_command("regsx").is_err());
        assert!(parse_command("light dim").is_err());
    }
}
