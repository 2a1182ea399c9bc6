//! Removable chips, one per flag.

#[cfg(test)]
#[path = "tags_test.rs"]
mod tests;

use crate::state::flags::FlagSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chip {
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagList {
    chips: Vec<Chip>,
}

impl TagList {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { chips: values.into_iter().map(|value| Chip { value: value.into() }).collect() }
    }

    #[must_use]
    pub fn from_flags(flags: &FlagSet) -> Self {
        Self::new(flags.iter())
    }

    #[must_use]
    pub fn chips(&self) -> &[Chip] {
        &self.chips
    }

    /// The value of the clicked chip, or `None` if no chip carries it.
    #[must_use]
    pub fn select(&self, value: &str) -> Option<&str> {
        self.chips.iter().find(|chip| chip.value == value).map(|chip| chip.value.as_str())
    }

    /// Chips as `[value x]`; an empty list renders nothing.
    #[must_use]
    pub fn render(&self) -> String {
        self.chips.iter().map(|chip| format!("[{} x]", chip.value)).collect::<Vec<_>>().join(" ")
    }
}
