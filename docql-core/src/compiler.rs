//! Top-level compilation: substitution per field, then command assembly.

use crate::command::{Command, CommandKind, Dispatcher, FormFields};
use crate::error::CompileResult;
use crate::template::{substitute, Bindings, Delimiters, ParameterTrace, SubstitutionMode};
use crate::value::Document;
use serde::{Deserialize, Serialize};

/// A command kind plus its raw, still-templated field texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub kind: CommandKind,
    pub fields: FormFields,
}

impl CommandRequest {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            fields: FormFields::new(),
        }
    }

    /// A raw command body.
    pub fn raw(body: impl Into<String>) -> Self {
        Self::new(CommandKind::Raw).with("body", body)
    }

    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.insert(name, text);
        self
    }
}

/// Result of a successful compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCommand {
    pub command: Command,
    /// Substituted text per supplied field, in request order.
    pub rendered: Vec<(String, String)>,
    pub trace: ParameterTrace,
}

impl CompiledCommand {
    pub fn document(&self) -> Document {
        self.command.to_document()
    }
}

#[derive(Debug, Clone)]
pub struct QueryCompiler {
    pub smart_substitution: bool,
    pub delimiters: Delimiters,
    pub default_find_limit: i64,
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self {
            smart_substitution: true,
            delimiters: Delimiters::default(),
            default_find_limit: 10,
        }
    }
}

impl QueryCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_smart_substitution(mut self, enabled: bool) -> Self {
        self.smart_substitution = enabled;
        self
    }

    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    pub fn with_default_find_limit(mut self, limit: i64) -> Self {
        self.default_find_limit = limit;
        self
    }

    /// Compile a request. Pure: no I/O and no shared state.
    pub fn compile(
        &self,
        request: &CommandRequest,
        bindings: &Bindings,
    ) -> CompileResult<CompiledCommand> {
        let mut trace = ParameterTrace::new();
        let mut rendered = Vec::with_capacity(request.fields.len());
        let mut resolved = Vec::with_capacity(request.fields.len());

        for (name, text) in request.fields.iter() {
            let field = Dispatcher::resolve_field(request.kind, name)?;
            let mode = if self.smart_substitution && !field.is_text() {
                SubstitutionMode::Smart
            } else {
                SubstitutionMode::Verbatim
            };

            let substitution = substitute(text, bindings, &self.delimiters, mode)
                .map_err(|e| e.in_field(name))?;
            trace.append(substitution.trace);
            rendered.push((name.to_string(), substitution.text.clone()));
            resolved.push((field, substitution.text));
        }

        let command = Dispatcher::new(self.default_find_limit).assemble(request.kind, &resolved)?;
        tracing::debug!(
            kind = %request.kind,
            parameters = trace.len(),
            "Compiled command"
        );

        Ok(CompiledCommand {
            command,
            rendered,
            trace,
        })
    }
}
