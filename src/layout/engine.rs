use log::debug;

use crate::layout::types::{Alignment, Column, DEFAULT_CHARS_PER_LINE};

/// Formats text into fixed width lines for a character cell printer.
///
/// All lengths are counted in characters (unicode scalar values), not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLayout {
    chars_per_line: usize,
}

fn fill(fill_char: char, count: usize) -> String {
    std::iter::repeat(fill_char).take(count).collect()
}

fn take_chars(text: &str, count: usize) -> String {
    text.chars().take(count).collect()
}

impl LineLayout {
    pub fn new(chars_per_line: usize) -> Self {
        LineLayout { chars_per_line }
    }

    pub fn chars_per_line(&self) -> usize {
        self.chars_per_line
    }

    /// Centers `text` on a line.
    ///
    /// Text that does not fit is cut at the line budget. Otherwise the free space is split in two
    /// equal halves; an odd remainder is dropped, so such a line is one character short.
    pub fn center(&self, text: &str, fill_char: char) -> String {
        let text_len = text.chars().count();

        if text_len >= self.chars_per_line {
            return take_chars(text, self.chars_per_line);
        }

        let pad = fill(fill_char, (self.chars_per_line - text_len) / 2);
        format!("{}{}{}", pad, text, pad)
    }

    /// Lays out one row of columns.
    ///
    /// `texts`, `widths` and `alignments` must have the same length and the widths may not add up
    /// to more than the line budget, otherwise an empty string is returned.
    ///
    /// Every column occupies `width + 1` characters (one more than its nominal width, which
    /// receipt templates rely on as the column gap). Longer text is cut to that size.
    pub fn row(&self, texts: &[&str], widths: &[usize], alignments: &[Alignment], fill_char: char) -> String {
        let columns = texts.len();

        if columns != widths.len() || columns != alignments.len() {
            debug!("Row rejected: {} texts, {} widths, {} alignments", columns, widths.len(), alignments.len());
            return String::new();
        }

        let total_width = widths.iter().try_fold(0usize, |acc, width| acc.checked_add(*width));

        match total_width {
            Some(total) if total <= self.chars_per_line => {},
            _ => {
                debug!("Row rejected: column widths exceed {} characters", self.chars_per_line);
                return String::new();
            },
        }

        let mut line = String::new();

        for ((text, width), alignment) in texts.iter().zip(widths).zip(alignments) {
            line.push_str(&render_column(text, *width, *alignment, fill_char));
        }

        line
    }

    /// Same as [`LineLayout::row`] with the columns given as triples.
    pub fn row_columns(&self, columns: &[Column], fill_char: char) -> String {
        let texts: Vec<&str> = columns.iter().map(|column| column.text.as_str()).collect();
        let widths: Vec<usize> = columns.iter().map(|column| column.width).collect();
        let alignments: Vec<Alignment> = columns.iter().map(|column| column.alignment).collect();

        self.row(&texts, &widths, &alignments, fill_char)
    }
}

impl Default for LineLayout {
    fn default() -> Self {
        LineLayout::new(DEFAULT_CHARS_PER_LINE)
    }
}

fn render_column(text: &str, width: usize, alignment: Alignment, fill_char: char) -> String {
    let text_len = text.chars().count();

    if text_len > width {
        return take_chars(text, width + 1);
    }

    let spaces = width - text_len + 1;

    match alignment {
        Alignment::Right => format!("{}{}", text, fill(fill_char, spaces)),
        Alignment::Left => format!("{}{}", fill(fill_char, spaces), text),
        Alignment::Center => {
            let pad = fill(fill_char, spaces / 2);
            format!("{}{}{}", pad, text, pad)
        },
    }
}
