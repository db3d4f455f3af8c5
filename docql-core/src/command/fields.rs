use serde::{Deserialize, Serialize};
use std::fmt;

/// Named input slot of a form-style command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormField {
    Collection,
    Filter,
    Sort,
    Projection,
    Skip,
    Limit,
    Documents,
    Update,
    Key,
    Pipeline,
    Body,
}

impl FormField {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormField::Collection => "collection",
            FormField::Filter => "filter",
            FormField::Sort => "sort",
            FormField::Projection => "projection",
            FormField::Skip => "skip",
            FormField::Limit => "limit",
            FormField::Documents => "documents",
            FormField::Update => "update",
            FormField::Key => "key",
            FormField::Pipeline => "pipeline",
            FormField::Body => "body",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let field = match name {
            "collection" => FormField::Collection,
            "filter" => FormField::Filter,
            "sort" => FormField::Sort,
            "projection" => FormField::Projection,
            "skip" => FormField::Skip,
            "limit" => FormField::Limit,
            "documents" => FormField::Documents,
            "update" => FormField::Update,
            "key" => FormField::Key,
            "pipeline" => FormField::Pipeline,
            "body" => FormField::Body,
            _ => return None,
        };
        Some(field)
    }

    /// Plain-text slots: placeholders are replaced verbatim, never quoted.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            FormField::Collection | FormField::Key | FormField::Skip | FormField::Limit
        )
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw field texts keyed by field name, in the order supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormFields {
    entries: Vec<(String, String)>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    /// Set a field, replacing an earlier text for the same name.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let text = text.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = text,
            None => self.entries.push((name, text)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, T: Into<String>> FromIterator<(N, T)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (N, T)>>(iter: I) -> Self {
        let mut fields = FormFields::new();
        for (name, text) in iter {
            fields.insert(name, text);
        }
        fields
    }
}
