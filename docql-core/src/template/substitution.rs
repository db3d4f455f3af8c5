use super::scanner::{scan, Delimiters, PlaceholderOccurrence};
use crate::classifier::{classify, DataType};
use crate::error::{CompileError, CompileResult, ErrorCategory};
use crate::extjson::literals;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Binding key to raw value.
pub type Bindings = HashMap<String, String>;

/// How placeholder values are written into the template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionMode {
    /// Type- and quote-aware insertion.
    #[default]
    Smart,
    /// Raw value inserted unchanged.
    Verbatim,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub index: usize,
    pub value: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

/// Ordered record of every substituted value and its inferred type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ParameterTrace {
    entries: Vec<TraceEntry>,
}

impl ParameterTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: impl Into<String>, data_type: DataType) {
        self.entries.push(TraceEntry {
            index: self.entries.len(),
            value: value.into(),
            data_type,
        });
    }

    /// Append another trace, continuing this trace's numbering.
    pub fn append(&mut self, other: ParameterTrace) {
        for entry in other.entries {
            self.push(entry.value, entry.data_type);
        }
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(value, type)` pairs in order.
    pub fn pairs(&self) -> Vec<(&str, DataType)> {
        self.entries
            .iter()
            .map(|e| (e.value.as_str(), e.data_type))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pub text: String,
    pub trace: ParameterTrace,
}

/// Replace every placeholder in `template` with its bound value.
///
/// The output is assembled in a single pass over the original text, so a
/// substituted value that itself contains delimiters is never expanded again.
pub fn substitute(
    template: &str,
    bindings: &Bindings,
    delimiters: &Delimiters,
    mode: SubstitutionMode,
) -> CompileResult<Substitution> {
    let occurrences = scan(template, delimiters);
    let mut text = String::with_capacity(template.len());
    let mut trace = ParameterTrace::new();
    let mut cursor = 0;

    for occurrence in &occurrences {
        let raw = bindings.get(&occurrence.key).ok_or_else(|| {
            CompileError::new(
                ErrorCategory::UnboundPlaceholder,
                format!("Missing value for binding '{}'.", occurrence.key),
            )
        })?;
        let data_type = classify(raw);
        trace.push(raw.as_str(), data_type);

        let enclosing = whole_quote(template, occurrence, cursor);
        text.push_str(&template[cursor..occurrence.start]);
        cursor = occurrence.end;

        match mode {
            SubstitutionMode::Verbatim => text.push_str(raw),
            SubstitutionMode::Smart => {
                // Only a BSON value replaces the template's quote pair.
                if let Some(quote) = enclosing.filter(|_| data_type == DataType::Bson) {
                    text.pop();
                    text.push_str(raw);
                    cursor += quote.len_utf8();
                } else if let Some(quote) = occurrence.quote_char {
                    text.push_str(&render_inside_quote(raw, quote));
                } else {
                    text.push_str(&render_unquoted(raw, data_type));
                }
            }
        }
    }

    text.push_str(&template[cursor..]);
    tracing::debug!(
        placeholders = trace.len(),
        ?mode,
        "Substituted template placeholders"
    );

    Ok(Substitution { text, trace })
}

/// The quote char when the placeholder is the entire content of a quoted
/// region whose opening quote lies in not-yet-emitted literal text.
fn whole_quote(
    template: &str,
    occurrence: &PlaceholderOccurrence,
    cursor: usize,
) -> Option<char> {
    let quote = occurrence.quote_char?;
    if occurrence.start <= cursor {
        return None;
    }
    let before = template[..occurrence.start].chars().next_back()?;
    let after = template[occurrence.end..].chars().next()?;
    if before == quote && after == quote {
        Some(quote)
    } else {
        None
    }
}

fn render_unquoted(raw: &str, data_type: DataType) -> String {
    match data_type {
        DataType::Bson => raw.to_string(),
        DataType::Integer | DataType::Float => raw.trim().to_string(),
        DataType::String => {
            serde_json::to_string(raw).unwrap_or_else(|_| escape_for_quote(raw, '"'))
        }
    }
}

fn render_inside_quote(raw: &str, quote: char) -> String {
    let value = if literals::is_quoted_wrapper_literal(raw) {
        literals::unquote(raw).unwrap_or(raw)
    } else {
        raw
    };
    escape_for_quote(value, quote)
}

/// Escape backslashes, the enclosing quote and control characters.
pub fn escape_for_quote(raw: &str, quote: char) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
