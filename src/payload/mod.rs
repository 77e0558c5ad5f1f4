pub mod hex;

/// Horizontal tab, moves the print head to the next tab stop.
pub const TAB: u8 = 0x09;

/// Line feed, prints the buffered line and advances the paper.
pub const LINE_FEED: u8 = 0x0A;
