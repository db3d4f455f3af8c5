use serde::{Deserialize, Serialize};

/// Open/close marker pair enclosing a binding key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            open: "{{".to_string(),
            close: "}}".to_string(),
        }
    }
}

impl Delimiters {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }
}

/// One placeholder found in a template. Offsets are byte offsets covering
/// the delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderOccurrence {
    pub start: usize,
    pub end: usize,
    pub key: String,
    pub inside_quote: bool,
    pub quote_char: Option<char>,
}

/// Locate placeholders left to right.
///
/// Quote state is tracked only over literal text; quotes inside a placeholder
/// span never open or close a quoted region. An open delimiter without a
/// matching close leaves the rest of the template literal. A run such as
/// `{{{x}}}` starts the placeholder at the last possible open delimiter.
pub fn scan(template: &str, delimiters: &Delimiters) -> Vec<PlaceholderOccurrence> {
    let mut occurrences = Vec::new();
    if delimiters.open.is_empty() || delimiters.close.is_empty() {
        return occurrences;
    }

    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < template.len() {
        let rest = &template[i..];

        if rest.starts_with(&delimiters.open) {
            let next = i + first_char_len(rest);
            if template[next..].starts_with(&delimiters.open) {
                // not the last open delimiter in the run; leave this char literal
                i = next;
                continue;
            }

            let capture_start = i + delimiters.open.len();
            let Some(close_offset) = template[capture_start..].find(&delimiters.close) else {
                break;
            };
            let capture_end = capture_start + close_offset;
            let end = capture_end + delimiters.close.len();

            occurrences.push(PlaceholderOccurrence {
                start: i,
                end,
                key: template[capture_start..capture_end].trim().to_string(),
                inside_quote: quote.is_some(),
                quote_char: quote,
            });
            escaped = false;
            i = end;
            continue;
        }

        let Some(ch) = rest.chars().next() else {
            break;
        };
        if escaped {
            escaped = false;
        } else if ch == '\\' && quote.is_some() {
            escaped = true;
        } else if quote == Some(ch) {
            quote = None;
        } else if quote.is_none() && (ch == '"' || ch == '\'') {
            quote = Some(ch);
        }
        i += ch.len_utf8();
    }

    occurrences
}

fn first_char_len(s: &str) -> usize {
    s.chars().next().map(char::len_utf8).unwrap_or(1)
}
