use super::fields::FormField;
use crate::error::{CompileError, ErrorCategory};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported command families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Find,
    Insert,
    Update,
    Delete,
    Count,
    Distinct,
    Aggregate,
    FindAndModify,
    Raw,
}

impl CommandKind {
    pub const ALL: [CommandKind; 9] = [
        CommandKind::Find,
        CommandKind::Insert,
        CommandKind::Update,
        CommandKind::Delete,
        CommandKind::Count,
        CommandKind::Distinct,
        CommandKind::Aggregate,
        CommandKind::FindAndModify,
        CommandKind::Raw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Find => "FIND",
            CommandKind::Insert => "INSERT",
            CommandKind::Update => "UPDATE",
            CommandKind::Delete => "DELETE",
            CommandKind::Count => "COUNT",
            CommandKind::Distinct => "DISTINCT",
            CommandKind::Aggregate => "AGGREGATE",
            CommandKind::FindAndModify => "FIND_AND_MODIFY",
            CommandKind::Raw => "RAW",
        }
    }

    /// Fields the kind defines, required ones first.
    pub fn allowed_fields(&self) -> &'static [FormField] {
        use FormField::*;
        match self {
            CommandKind::Find => &[Collection, Filter, Sort, Projection, Skip, Limit],
            CommandKind::Insert => &[Collection, Documents],
            CommandKind::Update => &[Collection, Filter, Update, Limit],
            CommandKind::Delete => &[Collection, Filter, Limit],
            CommandKind::Count => &[Collection, Filter],
            CommandKind::Distinct => &[Collection, Key, Filter],
            CommandKind::Aggregate => &[Collection, Pipeline, Limit],
            CommandKind::FindAndModify | CommandKind::Raw => &[Body],
        }
    }

    pub fn required_fields(&self) -> &'static [FormField] {
        use FormField::*;
        match self {
            CommandKind::Find | CommandKind::Count => &[Collection],
            CommandKind::Insert => &[Collection, Documents],
            CommandKind::Update => &[Collection, Filter, Update],
            CommandKind::Delete => &[Collection, Filter],
            CommandKind::Distinct => &[Collection, Key],
            CommandKind::Aggregate => &[Collection, Pipeline],
            CommandKind::FindAndModify | CommandKind::Raw => &[Body],
        }
    }

    pub fn allows(&self, field: FormField) -> bool {
        self.allowed_fields().contains(&field)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = CompileError;

    /// Case-insensitive; `findAndModify`, `find_and_modify` and
    /// `FIND-AND-MODIFY` all name the same kind.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_uppercase();
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().replace('_', "") == normalized)
            .ok_or_else(|| {
                CompileError::new(
                    ErrorCategory::InvalidValue,
                    format!("Unsupported command kind '{}'.", s.trim()),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_names() {
        assert_eq!("find".parse::<CommandKind>().unwrap(), CommandKind::Find);
        assert_eq!(
            "findAndModify".parse::<CommandKind>().unwrap(),
            CommandKind::FindAndModify
        );
        assert_eq!(
            "FIND_AND_MODIFY".parse::<CommandKind>().unwrap(),
            CommandKind::FindAndModify
        );
        assert!("drop".parse::<CommandKind>().is_err());
    }

    #[test]
    fn test_required_subset_of_allowed() {
        for kind in CommandKind::ALL {
            for field in kind.required_fields() {
                assert!(kind.allows(*field), "{} requires {}", kind, field);
            }
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&CommandKind::FindAndModify).unwrap(),
            "\"FIND_AND_MODIFY\""
        );
    }
}
