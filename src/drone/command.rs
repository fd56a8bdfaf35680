//! Operator command tokens and the vehicle instructions they map to

use std::fmt;
use std::str::FromStr;

/// Linear speed (cm/s step) used for translation commands
pub const MOVE_SPEED: u32 = 30;
/// Rotation step (degrees) used for yaw commands
pub const ROTATION_SPEED: u32 = 30;

/// Symbolic operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DroneCommand {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
    Cw,
    Ccw,
    Takeoff,
    Land,
}

impl DroneCommand {
    pub const ALL: [DroneCommand; 10] = [
        DroneCommand::Forward,
        DroneCommand::Back,
        DroneCommand::Left,
        DroneCommand::Right,
        DroneCommand::Up,
        DroneCommand::Down,
        DroneCommand::Cw,
        DroneCommand::Ccw,
        DroneCommand::Takeoff,
        DroneCommand::Land,
    ];

    /// Token as sent by the browser
    pub fn token(&self) -> &'static str {
        match self {
            DroneCommand::Forward => "forward",
            DroneCommand::Back => "back",
            DroneCommand::Left => "left",
            DroneCommand::Right => "right",
            DroneCommand::Up => "up",
            DroneCommand::Down => "down",
            DroneCommand::Cw => "cw",
            DroneCommand::Ccw => "ccw",
            DroneCommand::Takeoff => "takeoff",
            DroneCommand::Land => "land",
        }
    }

    /// Movement commands go through the throttle, takeoff/land never do
    pub fn is_movement(&self) -> bool {
        !matches!(self, DroneCommand::Takeoff | DroneCommand::Land)
    }

    /// Concrete instruction string for the vehicle
    pub fn instruction(&self) -> String {
        match self {
            DroneCommand::Cw | DroneCommand::Ccw => format!("{} {}", self.token(), ROTATION_SPEED),
            DroneCommand::Takeoff | DroneCommand::Land => self.token().to_string(),
            _ => format!("{} {}", self.token(), MOVE_SPEED),
        }
    }
}

impl fmt::Display for DroneCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Token that does not name any command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown drone command token: {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for DroneCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DroneCommand::ALL
            .into_iter()
            .find(|cmd| cmd.token() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_table() {
        assert_eq!(DroneCommand::Forward.instruction(), "forward 30");
        assert_eq!(DroneCommand::Back.instruction(), "back 30");
        assert_eq!(DroneCommand::Up.instruction(), "up 30");
        assert_eq!(DroneCommand::Ccw.instruction(), "ccw 30");
        assert_eq!(DroneCommand::Takeoff.instruction(), "takeoff");
        assert_eq!(DroneCommand::Land.instruction(), "land");
    }

    #[test]
    fn test_parse_tokens() {
        for cmd in DroneCommand::ALL {
            assert_eq!(cmd.token().parse::<DroneCommand>().unwrap(), cmd);
        }
        assert!("FORWARD".parse::<DroneCommand>().is_err());
        assert!("flip".parse::<DroneCommand>().is_err());
    }

    #[test]
    fn test_movement_classification() {
        let movement = DroneCommand::ALL.iter().filter(|c| c.is_movement()).count();
        assert_eq!(movement, 8);
        assert!(!DroneCommand::Land.is_movement());
    }
}
