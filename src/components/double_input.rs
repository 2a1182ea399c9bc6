//! Two-field form, used for a password and its confirmation.

#[cfg(test)]
#[path = "double_input_test.rs"]
mod tests;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoubleInputForm {
    pub label: String,
    /// Render values as `*` instead of plain text.
    pub masked: bool,
    first: String,
    second: String,
}

impl DoubleInputForm {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), ..Self::default() }
    }

    #[must_use]
    pub fn masked(label: impl Into<String>) -> Self {
        Self { masked: true, ..Self::new(label) }
    }

    pub fn set_values(&mut self, first: impl Into<String>, second: impl Into<String>) {
        self.first = first.into();
        self.second = second.into();
    }

    #[must_use]
    pub fn values(&self) -> (&str, &str) {
        (&self.first, &self.second)
    }

    /// Emit both values and clear the form. Values are passed through
    /// untrimmed; either one empty emits nothing.
    ///
    /// Whether the two values agree is for the caller to decide.
    pub fn submit(&mut self) -> Option<(String, String)> {
        if self.first.is_empty() || self.second.is_empty() {
            return None;
        }
        Some((std::mem::take(&mut self.first), std::mem::take(&mut self.second)))
    }

    #[must_use]
    pub fn render(&self) -> String {
        format!("{}: [{}] [{}]", self.label, self.display(&self.first), self.display(&self.second))
    }

    fn display(&self, value: &str) -> String {
        if self.masked {
            "*".repeat(value.chars().count())
        } else {
            value.to_owned()
        }
    }
}
