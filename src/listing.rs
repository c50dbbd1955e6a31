//! Listing-file renderer: 132 columns, 66-line pages, the page header
//! repeated on every page, and at most one error message appended
//! after each offending source line.

use std::io::{self, Write};

use crate::error::Fault;

const PAGE_WIDTH: usize = 132;
const PAGE_LINES: usize = 66;
const HEADER_LINES: usize = 3;

pub struct ListingWriter<W: Write> {
    out: W,
    title: String,
    page: u32,
    line_on_page: usize,
}

impl<W: Write> ListingWriter<W> {
    pub fn new(out: W, title: &str) -> Self {
        Self {
            out,
            title: title.to_string(),
            page: 0,
            line_on_page: PAGE_LINES,
        }
    }

    fn emit(&mut self, text: &str) -> io::Result<()> {
        if self.line_on_page >= PAGE_LINES {
            self.page_break()?;
        }
        writeln!(self.out, "{}", clip(text, PAGE_WIDTH))?;
        self.line_on_page += 1;
        Ok(())
    }

    fn page_break(&mut self) -> io::Result<()> {
        self.page += 1;
        if self.page > 1 {
            writeln!(self.out, "\u{c}")?;
        }
        let header =
            format!("{:<width$}", self.title, width = PAGE_WIDTH - 12);
        writeln!(
            self.out,
            "{}  Page {:>4}",
            clip(&header, PAGE_WIDTH - 12),
            self.page
        )?;
        writeln!(self.out, "{}", "-".repeat(PAGE_WIDTH))?;
        self.line_on_page = HEADER_LINES;
        Ok(())
    }

    /// Echo the whole source with numbered lines, appending the first
    /// recorded fault of each line right after it.
    pub fn render(
        &mut self,
        source: &str,
        faults: &[Fault],
    ) -> io::Result<()> {
        for (index, text) in source.lines().enumerate() {
            let line_no = (index + 1) as u32;
            self.emit(&format!("{line_no:>6}  {text}"))?;
            let fault = faults
                .iter()
                .find(|f| f.line == Some(line_no));
            if let Some(fault) = fault {
                for message_line in fault.to_string().lines() {
                    self.emit(&format!("        {message_line}"))?;
                }
            }
        }
        let unplaced: Vec<&Fault> =
            faults.iter().filter(|f| f.line.is_none()).collect();
        if !unplaced.is_empty() {
            self.emit("")?;
            for fault in unplaced {
                for message_line in fault.to_string().lines() {
                    self.emit(message_line)?;
                }
            }
        }
        self.out.flush()
    }
}

/// Byte clip that never splits a character.
fn clip(text: &str, width: usize) -> &str {
    if text.len() <= width {
        return text;
    }
    let mut cut = width;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Fault, SdlError};

    #[test]
    fn faults_follow_their_line() {
        let mut out = Vec::new();
        let faults = vec![Fault {
            error: SdlError::NullStructure {
                name: "s".to_string(),
            },
            line: Some(2),
            aggregates: vec![],
        }];
        ListingWriter::new(&mut out, "test")
            .render("first\nsecond\nthird\n", &faults)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[3].contains("second"));
        assert!(lines[4].contains("NULLSTRUCT"));
        assert!(lines[5].contains("third"));
    }

    #[test]
    fn long_lines_clip_at_page_width() {
        let mut out = Vec::new();
        let wide = "x".repeat(200);
        ListingWriter::new(&mut out, "test")
            .render(&wide, &[])
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().all(|l| l.len() <= PAGE_WIDTH));
    }
}
