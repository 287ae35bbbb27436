use serde::{Deserialize, Serialize};

/// One of the two players in a game. Encoded on the wire as `{RED: 0, BLUE: 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Side {
    Red,
    Blue,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Red => Side::Blue,
            Side::Blue => Side::Red,
        }
    }

    pub fn all() -> [Side; 2] {
        [Side::Red, Side::Blue]
    }
}

impl From<Side> for u8 {
    fn from(side: Side) -> u8 {
        match side {
            Side::Red => 0,
            Side::Blue => 1,
        }
    }
}

impl TryFrom<u8> for Side {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Side::Red),
            1 => Ok(Side::Blue),
            other => Err(format!("invalid side discriminant {other}")),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Red => write!(f, "RED"),
            Side::Blue => write!(f, "BLUE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_is_an_involution() {
        for side in Side::all() {
            assert_eq!(side.other().other(), side);
            assert_ne!(side.other(), side);
        }
    }

    #[test]
    fn wire_encoding_matches_spec() {
        assert_eq!(u8::from(Side::Red), 0);
        assert_eq!(u8::from(Side::Blue), 1);
        assert_eq!(Side::try_from(0).unwrap(), Side::Red);
        assert_eq!(Side::try_from(1).unwrap(), Side::Blue);
        assert!(Side::try_from(2).is_err());
    }
}
