use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;
use thiserror::Error;

/// Byte range into the script source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }
}

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Parse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Warning,
    Error,
}

/// A structural error recorded against the syntax tree.
///
/// Diagnostics never abort parsing; they accumulate on the tree so that every
/// problem in a script can be shown at once.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub row: usize,
    pub column: usize,
    pub level: Level,
    pub stage: Stage,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(stage: Stage, level: Level, row: usize, column: usize, span: Span, message: String) -> Self {
        Self {
            row,
            column,
            level,
            stage,
            message,
            span,
        }
    }

    pub fn scan_error(row: usize, column: usize, span: Span, message: String) -> Self {
        Self::new(Stage::Scan, Level::Error, row, column, span, message)
    }

    pub fn parse_error(row: usize, column: usize, span: Span, message: String) -> Self {
        Self::new(Stage::Parse, Level::Error, row, column, span, message)
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let (kind_str, color) = match self.stage {
            Stage::Scan => ("Scan Error", Color::Red),
            Stage::Parse => ("Parse Error", Color::Yellow),
        };
        let kind = match self.level {
            Level::Warning => ReportKind::Warning,
            Level::Error => ReportKind::Error,
        };
        emit(kind, kind_str, color, Some(self.span), &self.message, None, source, filename);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}: {}", self.row, self.column, self.message)
    }
}

/// Failure categories of the execution machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required argument or node was missing.
    NullPointer,
    /// Wrong operand type or malformed parameter.
    InvalidParam,
    /// Operation not allowed in the variable's current state.
    StateError,
    /// Unknown variable, function or label.
    NotFound,
    OutOfMemory,
    /// Re-declaration of a name in the same environment.
    Duplicate,
    /// Value outside the range an operator accepts.
    Overflow,
    NotImplemented,
    /// The AST does not have the shape the machine expects.
    ReadError,
    /// Call depth exceeded the configured bound.
    StackOverflow,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NullPointer => "missing value",
            ErrorKind::InvalidParam => "invalid parameter",
            ErrorKind::StateError => "state error",
            ErrorKind::NotFound => "not found",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Overflow => "overflow",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::ReadError => "read error",
            ErrorKind::StackOverflow => "stack overflow",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every fallible execution-machine operation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ExecError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
}

pub type ExecResult<T> = Result<T, ExecError>;

impl ExecError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }

    /// Attach a source location unless a more precise one is already set.
    pub fn at(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn null_pointer(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NullPointer, message)
    }

    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParam, message)
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Duplicate, message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Overflow, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    pub fn read_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReadError, message)
    }

    pub fn stack_overflow(depth: usize) -> Self {
        Self::new(
            ErrorKind::StackOverflow,
            format!("call depth exceeded the limit of {}", depth),
        )
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let help = match self.kind {
            ErrorKind::NotFound => Some("Declare variables with 'var' and define functions before calling them."),
            ErrorKind::Duplicate => Some("A name can be declared once per block; inner blocks may shadow it."),
            ErrorKind::StateError => Some("Write-protected values and temporaries cannot be modified."),
            ErrorKind::StackOverflow => Some("Check for unbounded recursion or raise --max-depth."),
            _ => None,
        };
        emit(
            ReportKind::Error,
            "Runtime Error",
            Color::Magenta,
            self.span,
            &format!("{}: {}", self.kind, self.message),
            help,
            source,
            filename,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn emit(
    kind: ReportKind,
    kind_str: &str,
    color: Color,
    span: Option<Span>,
    message: &str,
    help: Option<&str>,
    source: &str,
    filename: Option<&str>,
) {
    let filename = filename.unwrap_or("<repl>");
    let offset = span.map(|s| s.start).unwrap_or(0);

    let mut report_builder = Report::build(kind, filename, offset)
        .with_message(format!("{}: {}", kind_str.fg(color), message));

    if let Some(span) = span {
        // Clamp so a span at end of input still points inside the source.
        let end = span.end.min(source.len()).max(span.start.min(source.len()));
        let start = span.start.min(end);
        report_builder = report_builder.with_label(
            Label::new((filename, start..end))
                .with_message(message)
                .with_color(color),
        );
    }

    if let Some(help_text) = help {
        report_builder = report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
    }

    if let Err(err) = report_builder
        .finish()
        .print((filename, Source::from(source)))
    {
        tracing::warn!("failed to print diagnostic: {}", err);
    }
}
