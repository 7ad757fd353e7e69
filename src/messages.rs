// Commands shared by the keyboard and UDP sources, plus the UDP text grammar
//
// Wire format is colon-delimited text, e.g.
//   MODE_CHANGED:AUTO
//   SELECTED_COORDS:ID:0:X:273:Y:306:FRAME:388
//   BUTTON_PRESSED:left
// and legacy bare tokens (up, down, left, right, esc).

use std::fmt;
use std::str::FromStr;

/// Control mode of the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Manual,
    Auto,
}

impl FromStr for Mode {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("AUTO") {
            Ok(Mode::Auto)
        } else if s.eq_ignore_ascii_case("MANUAL") {
            Ok(Mode::Manual)
        } else {
            Err(MessageError::UnknownMode(s.to_string()))
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Manual => f.write_str("MANUAL"),
            Mode::Auto => f.write_str("AUTO"),
        }
    }
}

/// Manual jog direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Centroid of the selected target in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingTarget {
    pub x: i32,
    pub y: i32,
    /// Frame sequence number, when the sender includes one
    pub frame: Option<u32>,
}

/// A command from any source, applied by the arbiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ModeChanged(Mode),
    TargetSelected(TrackingTarget),
    TouchMiss,
    Jog(Direction),
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("Payload is not valid UTF-8")]
    Encoding,

    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("{command} is missing its {field} field")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    #[error("Invalid number for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Unknown mode: {0:?}")]
    UnknownMode(String),

    #[error("Unknown direction: {0:?}")]
    UnknownDirection(String),
}

impl Command {
    /// Decode a raw UDP datagram
    pub fn from_datagram(data: &[u8]) -> Result<Self, MessageError> {
        let text = std::str::from_utf8(data).map_err(|_| MessageError::Encoding)?;
        text.parse()
    }
}

impl FromStr for Command {
    type Err = MessageError;

    fn from_str(message: &str) -> Result<Self, Self::Err> {
        let message = message.trim();

        if !message.contains(':') {
            return parse_bare(message);
        }

        let parts: Vec<&str> = message.split(':').collect();
        match parts[0] {
            "MODE_CHANGED" => {
                let mode = parts.get(1).ok_or(MessageError::MissingField {
                    command: "MODE_CHANGED",
                    field: "mode",
                })?;
                Ok(Command::ModeChanged(mode.parse()?))
            }
            "OBJECT_SELECTED" | "SELECTED_COORDS" => parse_target(&parts).map(Command::TargetSelected),
            "TOUCH_MISS" => Ok(Command::TouchMiss),
            "BUTTON_PRESSED" => {
                let direction = parts.get(1).ok_or(MessageError::MissingField {
                    command: "BUTTON_PRESSED",
                    field: "direction",
                })?;
                parse_button(direction)
            }
            other => Err(MessageError::UnknownCommand(other.to_string())),
        }
    }
}

/// Legacy single-token messages
fn parse_bare(token: &str) -> Result<Command, MessageError> {
    if token == "TOUCH_MISS" {
        return Ok(Command::TouchMiss);
    }
    match token.to_ascii_lowercase().as_str() {
        "up" => Ok(Command::Jog(Direction::Up)),
        "down" => Ok(Command::Jog(Direction::Down)),
        "left" => Ok(Command::Jog(Direction::Left)),
        "right" => Ok(Command::Jog(Direction::Right)),
        "esc" => Ok(Command::Terminate),
        _ => Err(MessageError::UnknownCommand(token.to_string())),
    }
}

fn parse_button(direction: &str) -> Result<Command, MessageError> {
    match direction.to_ascii_lowercase().as_str() {
        "up" => Ok(Command::Jog(Direction::Up)),
        "down" => Ok(Command::Jog(Direction::Down)),
        "left" => Ok(Command::Jog(Direction::Left)),
        "right" => Ok(Command::Jog(Direction::Right)),
        "esc" | "stop" => Ok(Command::Terminate),
        _ => Err(MessageError::UnknownDirection(direction.to_string())),
    }
}

/// Scan for `X:<int>`, `Y:<int>` and an optional `FRAME:<int>` anywhere in the token list
fn parse_target(parts: &[&str]) -> Result<TrackingTarget, MessageError> {
    let mut x = None;
    let mut y = None;
    let mut frame = None;

    for (i, &part) in parts.iter().enumerate() {
        let Some(&value) = parts.get(i + 1) else {
            break;
        };
        match part {
            "X" => x = Some(parse_number::<i32>("X", value)?),
            "Y" => y = Some(parse_number::<i32>("Y", value)?),
            // Only logged, so a bad counter doesn't cost the coordinates
            "FRAME" => frame = value.trim().parse::<u32>().ok(),
            _ => {}
        }
    }

    let command = if parts[0] == "OBJECT_SELECTED" {
        "OBJECT_SELECTED"
    } else {
        "SELECTED_COORDS"
    };
    Ok(TrackingTarget {
        x: x.ok_or(MessageError::MissingField { command, field: "X" })?,
        y: y.ok_or(MessageError::MissingField { command, field: "Y" })?,
        frame,
    })
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, MessageError> {
    value.trim().parse().map_err(|_| MessageError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Command, MessageError> {
        s.parse()
    }

    #[test]
    fn test_mode_changed() {
        assert_eq!(parse("MODE_CHANGED:AUTO"), Ok(Command::ModeChanged(Mode::Auto)));
        assert_eq!(parse("MODE_CHANGED:manual"), Ok(Command::ModeChanged(Mode::Manual)));
        assert!(matches!(parse("MODE_CHANGED:FOLLOW"), Err(MessageError::UnknownMode(_))));
        // "MODE_CHANGED:" splits into an empty mode token
        assert!(matches!(parse("MODE_CHANGED:"), Err(MessageError::UnknownMode(_))));
    }

    #[test]
    fn test_selected_coords() {
        let cmd = parse("SELECTED_COORDS:ID:0:X:273:Y:306:FRAME:388").unwrap();
        assert_eq!(
            cmd,
            Command::TargetSelected(TrackingTarget {
                x: 273,
                y: 306,
                frame: Some(388)
            })
        );

        let cmd = parse("OBJECT_SELECTED:person:Y:10:X:-4").unwrap();
        assert_eq!(
            cmd,
            Command::TargetSelected(TrackingTarget {
                x: -4,
                y: 10,
                frame: None
            })
        );
    }

    #[test]
    fn test_selected_coords_malformed() {
        assert_eq!(
            parse("SELECTED_COORDS:ID:0:X:273:FRAME:1"),
            Err(MessageError::MissingField {
                command: "SELECTED_COORDS",
                field: "Y"
            })
        );
        assert!(matches!(
            parse("SELECTED_COORDS:X:abc:Y:3"),
            Err(MessageError::InvalidNumber { field: "X", .. })
        ));
        // Trailing X with no value
        assert!(matches!(
            parse("OBJECT_SELECTED:Y:3:X"),
            Err(MessageError::MissingField { field: "X", .. })
        ));
    }

    #[test]
    fn test_bad_frame_keeps_coordinates() {
        for raw in [
            "SELECTED_COORDS:X:10:Y:20:FRAME:-1",
            "SELECTED_COORDS:X:10:Y:20:FRAME:abc",
            "SELECTED_COORDS:X:10:Y:20:FRAME:99999999999",
        ] {
            assert_eq!(
                parse(raw),
                Ok(Command::TargetSelected(TrackingTarget {
                    x: 10,
                    y: 20,
                    frame: None
                }))
            );
        }
    }

    #[test]
    fn test_touch_miss() {
        assert_eq!(parse("TOUCH_MISS"), Ok(Command::TouchMiss));
        assert_eq!(parse("TOUCH_MISS:120:40"), Ok(Command::TouchMiss));
    }

    #[test]
    fn test_button_pressed() {
        assert_eq!(parse("BUTTON_PRESSED:left"), Ok(Command::Jog(Direction::Left)));
        assert_eq!(parse("BUTTON_PRESSED:UP"), Ok(Command::Jog(Direction::Up)));
        assert_eq!(parse("BUTTON_PRESSED:stop"), Ok(Command::Terminate));
        assert_eq!(parse("BUTTON_PRESSED:esc"), Ok(Command::Terminate));
        assert!(matches!(
            parse("BUTTON_PRESSED:spin"),
            Err(MessageError::UnknownDirection(_))
        ));
        assert!(matches!(parse("BUTTON_PRESSED:"), Err(MessageError::UnknownDirection(_))));
    }

    #[test]
    fn test_legacy_tokens() {
        assert_eq!(parse("up"), Ok(Command::Jog(Direction::Up)));
        assert_eq!(parse("DOWN"), Ok(Command::Jog(Direction::Down)));
        assert_eq!(parse("Right\n"), Ok(Command::Jog(Direction::Right)));
        assert_eq!(parse("ESC"), Ok(Command::Terminate));
        assert!(matches!(parse("hello"), Err(MessageError::UnknownCommand(_))));
        assert!(matches!(parse("FOO:BAR"), Err(MessageError::UnknownCommand(_))));
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(Command::from_datagram(&[0xFF, 0xFE]), Err(MessageError::Encoding));
        assert_eq!(Command::from_datagram(b"left"), Ok(Command::Jog(Direction::Left)));
    }
}
