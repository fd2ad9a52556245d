//! Indentation-aware text buffer for command generation.

/// Appends text, prefixing the current indent at the start of each line.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    text: String,
    indent_unit: String,
    level: usize,
    at_line_start: bool,
}

impl CommandBuilder {
    pub fn new(indent_unit: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            indent_unit: indent_unit.into(),
            level: 0,
            at_line_start: true,
        }
    }

    pub fn append(&mut self, value: &str) -> &mut Self {
        if value.is_empty() {
            return self;
        }
        if self.at_line_start {
            for _ in 0..self.level {
                self.text.push_str(&self.indent_unit);
            }
            self.at_line_start = false;
        }
        self.text.push_str(value);
        self
    }

    pub fn append_line(&mut self) -> &mut Self {
        self.text.push('\n');
        self.at_line_start = true;
        self
    }

    pub fn increment_indent(&mut self) -> &mut Self {
        self.level += 1;
        self
    }

    pub fn decrement_indent(&mut self) -> &mut Self {
        self.level = self.level.saturating_sub(1);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new("    ")
    }
}
