//! Diagnostics for project file errors with source spans

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Any failure to load a YAML file
#[derive(Debug, Error, Diagnostic)]
pub enum YamlError {
    #[error("Failed to read file: {0}")]
    #[diagnostic(code(ptk::yaml::io))]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] YamlSyntaxError),
}

/// YAML syntax or schema error pointing into the file
#[derive(Debug, Error, Diagnostic)]
#[error("Invalid project file: {message}")]
#[diagnostic(
    code(ptk::yaml::syntax),
    help("check the indentation and the field names against `ptk example`")
)]
pub struct YamlSyntaxError {
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: Option<SourceSpan>,

    /// 1-based line of the error, when known
    pub line: Option<usize>,
}

impl YamlSyntaxError {
    pub fn from_serde_error(error: &serde_yml::Error, content: &str, filename: &str) -> Self {
        Self {
            message: error.to_string(),
            src: NamedSource::new(filename, content.to_string()),
            span: error
                .location()
                .map(|location| span_to_line_end(content, location.index())),
            line: error.location().map(|location| location.line()),
        }
    }
}

/// Span from a character index to the end of its line
///
/// The parser counts characters; spans are byte offsets.
fn span_to_line_end(content: &str, char_index: usize) -> SourceSpan {
    let offset = content
        .char_indices()
        .nth(char_index)
        .map_or(content.len(), |(offset, _)| offset);
    let rest = &content[offset..];
    let length = rest.find('\n').unwrap_or(rest.len()).max(1).min(rest.len());
    SourceSpan::from((offset, length))
}
