use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/**
 * Number of characters a 58mm receipt printer fits on one line using its default font.
 */
pub const DEFAULT_CHARS_PER_LINE: usize = 30;

/// Where the padding of a column goes.
///
/// The names follow the receipt template convention: `Right` pads on
/// the right side (so the text itself is flush left), `Left` pads on the left side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Alignment {
    Left,
    Right,
    Center,
}

impl FromStr for Alignment {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" | "l" | "left" => Ok(Alignment::Left),
            "R" | "r" | "right" => Ok(Alignment::Right),
            "C" | "c" | "center" => Ok(Alignment::Center),
            _ => Err(LayoutError::UnknownAlignment(s.to_string())),
        }
    }
}

impl std::fmt::Display for Alignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Alignment::Left => "L",
            Alignment::Right => "R",
            Alignment::Center => "C",
        };

        write!(f, "{}", result)
    }
}

/// One field of a printed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub text: String,
    pub width: usize,
    pub alignment: Alignment,
}

impl Column {
    pub fn new(text: impl Into<String>, width: usize, alignment: Alignment) -> Self {
        Column { text: text.into(), width, alignment }
    }
}

impl FromStr for Column {
    type Err = LayoutError;

    // TEXT:WIDTH:ALIGN, the text itself may contain ':'
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ':');
        let (alignment, width, text) = match (parts.next(), parts.next(), parts.next()) {
            (Some(alignment), Some(width), Some(text)) => (alignment, width, text),
            _ => return Err(LayoutError::MalformedColumn(s.to_string())),
        };

        let width = width.parse::<usize>()
            .map_err(|_| LayoutError::MalformedColumn(s.to_string()))?;

        Ok(Column::new(text, width, alignment.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_codes() {
        assert_eq!("L".parse::<Alignment>().unwrap(), Alignment::Left);
        assert_eq!("R".parse::<Alignment>().unwrap(), Alignment::Right);
        assert_eq!("center".parse::<Alignment>().unwrap(), Alignment::Center);
        assert!("X".parse::<Alignment>().is_err());
        assert_eq!(Alignment::Center.to_string(), "C");
    }

    #[test]
    fn test_column_parse() {
        let column: Column = "Total: 12:20:L".parse().unwrap();
        assert_eq!(column, Column::new("Total: 12", 20, Alignment::Left));

        assert!("Item:twenty:L".parse::<Column>().is_err());
        assert!("Item:20".parse::<Column>().is_err());
    }
}
