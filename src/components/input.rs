//! Single-field form that emits its value on submit.

#[cfg(test)]
#[path = "input_test.rs"]
mod tests;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputForm {
    pub label: String,
    pub placeholder: String,
    value: String,
}

impl InputForm {
    #[must_use]
    pub fn new(label: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self { label: label.into(), placeholder: placeholder.into(), value: String::new() }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    /// Emit the trimmed value and clear the field. Blank input emits nothing.
    pub fn submit(&mut self) -> Option<String> {
        let value = std::mem::take(&mut self.value);
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(value.to_owned())
    }

    #[must_use]
    pub fn render(&self) -> String {
        if self.value.is_empty() {
            format!("{}: ({})", self.label, self.placeholder)
        } else {
            format!("{}: {}", self.label, self.value)
        }
    }
}
