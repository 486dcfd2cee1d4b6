use std::fmt;

/// Broad category of a failure. Drives how callers react: protocol errors are
/// logged and dropped, invariant errors abort the current operation,
/// external-call errors degrade to "nothing to fill/save".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed message or message for a flow that no longer exists
    Protocol,
    /// Internal model became inconsistent (programming error)
    Invariant,
    /// Vault client call failed
    Network,
    /// Collaborator store could not be read or written
    Storage,
    /// HTML, JSON or YAML input could not be parsed
    Parse,
    /// File or stream I/O failed
    Io,
    /// Configuration is unusable
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Protocol => "protocol",
            ErrorKind::Invariant => "invariant",
            ErrorKind::Network => "network",
            ErrorKind::Storage => "storage",
            ErrorKind::Parse => "parse",
            ErrorKind::Io => "io",
            ErrorKind::Config => "config",
        }
    }
}

#[derive(Debug)]
pub struct AutofillError {
    pub kind: ErrorKind,
    /// Module that raised the error, e.g. "scanner" or "save_flow"
    pub context: &'static str,
    pub message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

pub type Result<T> = std::result::Result<T, AutofillError>;

impl AutofillError {
    pub fn new(kind: ErrorKind, context: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            context,
            message: message.into(),
            source: None,
        }
    }

    pub fn protocol(context: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, context, message)
    }

    pub fn invariant(context: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invariant, context, message)
    }

    pub fn network(context: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, context, message)
    }

    pub fn storage(context: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, context, message)
    }

    pub fn parse(context: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, context, message)
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for AutofillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error in {}: {}", self.kind.as_str(), self.context, self.message)?;
        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AutofillError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for AutofillError {
    fn from(e: std::io::Error) -> Self {
        AutofillError::new(ErrorKind::Io, "io", "I/O operation failed").with_source(e)
    }
}

impl From<serde_json::Error> for AutofillError {
    fn from(e: serde_json::Error) -> Self {
        AutofillError::parse("json", "JSON (de)serialization failed").with_source(e)
    }
}

impl From<serde_yaml::Error> for AutofillError {
    fn from(e: serde_yaml::Error) -> Self {
        AutofillError::parse("yaml", "YAML (de)serialization failed").with_source(e)
    }
}
