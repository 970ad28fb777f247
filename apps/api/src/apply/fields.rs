//! Logical form fields and the selector table used to find them on unknown pages.

use std::fmt;

/// An abstract form-field role, independent of any site's HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalField {
    Name,
    Email,
    Resume,
    Submit,
}

/// How a located field is acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Receives typed text.
    Text,
    /// Receives the resume file.
    File,
    /// Located only; never invoked.
    Control,
}

impl LogicalField {
    /// Order in which the filler walks a form.
    pub const FILL_ORDER: [LogicalField; 4] = [
        LogicalField::Name,
        LogicalField::Email,
        LogicalField::Resume,
        LogicalField::Submit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalField::Name => "name",
            LogicalField::Email => "email",
            LogicalField::Resume => "resume",
            LogicalField::Submit => "submit",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            LogicalField::Name | LogicalField::Email => FieldKind::Text,
            LogicalField::Resume => FieldKind::File,
            LogicalField::Submit => FieldKind::Control,
        }
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority-ordered CSS selector patterns per logical field.
///
/// Most specific patterns come first. Heuristics are extended by pushing
/// more patterns, not by adding branches to the locator.
#[derive(Debug, Clone)]
pub struct SelectorTable {
    entries: Vec<(LogicalField, Vec<String>)>,
}

impl Default for SelectorTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.extend(
            LogicalField::Name,
            [
                r#"input[autocomplete="name"]"#,
                r#"input[name*="name" i]"#,
                r#"input[placeholder*="name" i]"#,
            ],
        );
        table.extend(
            LogicalField::Email,
            [
                r#"input[type="email"]"#,
                r#"input[name*="email" i]"#,
                r#"input[placeholder*="email" i]"#,
            ],
        );
        table.extend(
            LogicalField::Resume,
            [r#"input[type="file"]"#, r#"input[accept*=".pdf"]"#],
        );
        table.extend(
            LogicalField::Submit,
            [r#"button[type="submit"]"#, r#"input[type="submit"]"#],
        );
        table
    }
}

impl SelectorTable {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a lowest-priority pattern for `field`.
    pub fn push(&mut self, field: LogicalField, selector: impl Into<String>) {
        let selector = selector.into();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some((_, patterns)) => patterns.push(selector),
            None => self.entries.push((field, vec![selector])),
        }
    }

    pub fn extend<I, S>(&mut self, field: LogicalField, selectors: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for selector in selectors {
            self.push(field, selector);
        }
    }

    /// Patterns for `field`, most reliable first. Empty if none are registered.
    pub fn patterns(&self, field: LogicalField) -> &[String] {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, p)| p.as_slice())
            .unwrap_or(&[])
    }
}
