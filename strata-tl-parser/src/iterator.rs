//! Iterator that drives [`crate::parse_tl_file`].

use std::str::FromStr;

use crate::errors::ParseError;
use crate::tl::{Category, Definition};

pub(crate) struct TlIterator<'a> {
    lines: std::str::Lines<'a>,
    category: Category,
    /// Text of a definition that has not reached its `;` yet.
    pending: String,
    done: bool,
}

impl<'a> TlIterator<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self {
            lines: src.lines(),
            category: Category::Types,
            pending: String::new(),
            done: false,
        }
    }

    fn switch_section(&mut self, line: &str) -> bool {
        match line {
            "---functions---" => self.category = Category::Functions,
            "---types---" => self.category = Category::Types,
            _ => return false,
        }
        true
    }

    fn finish(&mut self, raw: &str) -> Result<Definition, ParseError> {
        let mut def = Definition::from_str(raw)?;
        def.category = self.category;
        Ok(def)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(at) => &line[..at],
        None => line,
    }
}

impl Iterator for TlIterator<'_> {
    type Item = Result<Definition, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let Some(line) = self.lines.next() else {
                self.done = true;
                return if self.pending.trim().is_empty() {
                    None
                } else {
                    Some(Err(ParseError::Unterminated))
                };
            };

            let line = strip_comment(line).trim();
            if line.is_empty() || self.switch_section(line) {
                continue;
            }

            let mut parts = line.splitn(2, ';');
            let head = parts.next().unwrap_or_default();
            self.pending.push(' ');
            self.pending.push_str(head);

            // No `;` on this line yet: the definition continues below.
            if parts.next().is_none() {
                continue;
            }

            let raw = std::mem::take(&mut self.pending);
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            return Some(self.finish(raw));
        }
    }
}
