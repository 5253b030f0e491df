//! Engine errors
//!
//! Template failures keep the values source so miette can point at the
//! offending line.

use app2kube_core::CoreError;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::suggestions::{self, name_in_message};

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("failed to read values from {source_name}: {error}")]
    ReadSource {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("failed to fetch {url}: {message}")]
    Network { url: String, message: String },

    #[error("failed to parse {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Configuration error raised while building resources
    pub fn config(message: impl Into<String>) -> Self {
        Self::Core(CoreError::config(message))
    }

    /// True for errors the user fixes by editing values rather than retrying
    pub fn is_config(&self) -> bool {
        match self {
            Self::Core(e) => e.is_config(),
            Self::Parse { .. } => true,
            _ => false,
        }
    }
}

/// What went wrong while rendering a values template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

impl From<minijinja::ErrorKind> for TemplateErrorKind {
    fn from(kind: minijinja::ErrorKind) -> Self {
        use minijinja::ErrorKind as K;
        match kind {
            K::UndefinedError => Self::UndefinedVariable,
            K::UnknownFilter => Self::UnknownFilter,
            K::UnknownFunction => Self::UnknownFunction,
            K::SyntaxError | K::BadEscape => Self::SyntaxError,
            K::NonPrimitive | K::NonKey | K::CannotUnpack => Self::TypeError,
            K::InvalidOperation => Self::InvalidOperation,
            _ => Self::Other,
        }
    }
}

/// A values file failed the templating pass
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(app2kube::values::template))]
pub struct TemplateError {
    pub message: String,
    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Map a MiniJinja error onto `source`, with a hint where one applies
    pub fn from_minijinja(err: minijinja::Error, source_name: &str, source: &str) -> Self {
        let kind = TemplateErrorKind::from(err.kind());
        let detail = format!("{err:#}");
        let plain = err.detail().map(str::to_string).unwrap_or_else(|| err.to_string());

        let (message, suggestion) = match kind {
            TemplateErrorKind::UndefinedVariable => {
                let name = marked_expression(&detail).or_else(|| name_in_message(&plain, "variable"));
                match name {
                    Some(name) => (
                        format!("undefined variable `{name}`"),
                        Some(suggestions::for_undefined(&name)),
                    ),
                    None => (
                        plain,
                        Some("values templates have no variables; use `env(\"NAME\")`".to_string()),
                    ),
                }
            }
            TemplateErrorKind::UnknownFilter => {
                match marked_filter(&detail).or_else(|| name_in_message(&plain, "filter")) {
                    Some(name) => (
                        format!("unknown filter `{name}`"),
                        Some(suggestions::for_filter(&name)),
                    ),
                    None => (plain, None),
                }
            }
            TemplateErrorKind::UnknownFunction => {
                let hint = name_in_message(&plain, "function")
                    .map(|name| suggestions::for_function(&name));
                (plain, hint)
            }
            TemplateErrorKind::SyntaxError => (
                plain,
                Some("expressions use `{{ }}`, statements `{% %}` and comments `{# #}`".to_string()),
            ),
            TemplateErrorKind::TypeError if plain.contains("not iterable") => (
                plain,
                Some("iterate mappings with `| dictsort` or `| items`".to_string()),
            ),
            _ => (plain, None),
        };

        Self {
            message,
            kind,
            src: NamedSource::new(source_name, source.to_string()),
            span: err.line().and_then(|line| line_span(source, line)),
            suggestion,
        }
    }

    /// Error without a source to point into
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TemplateErrorKind::Other,
            src: NamedSource::new("<values>", String::new()),
            span: None,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

/// The `{{ ... }}` body on the line MiniJinja marks with `>`
fn marked_line_expression(detail: &str) -> Option<&str> {
    detail
        .lines()
        .filter(|line| {
            let line = line.trim_start();
            line.starts_with("> ") || line.contains(" > ")
        })
        .find_map(|line| {
            let open = line.find("{{")? + 2;
            let close = line[open..].find("}}")?;
            Some(line[open..open + close].trim())
        })
}

/// Left-hand side of the marked expression, before any filter
fn marked_expression(detail: &str) -> Option<String> {
    let expr = marked_line_expression(detail)?;
    let head = expr.split('|').next().unwrap_or(expr).trim();
    (!head.is_empty()).then(|| head.to_string())
}

/// Last filter applied in the marked expression
fn marked_filter(detail: &str) -> Option<String> {
    let expr = marked_line_expression(detail)?;
    let (_, tail) = expr.rsplit_once('|')?;
    tail.split(|c: char| c.is_whitespace() || c == '(')
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Span covering line `line` (1-based) of `source`
fn line_span(source: &str, line: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (idx, text) in source.lines().enumerate() {
        if idx + 1 == line {
            return Some(SourceSpan::new(offset.into(), text.len()));
        }
        offset += text.len() + 1;
    }
    None
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
