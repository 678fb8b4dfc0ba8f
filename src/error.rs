//! Common error types.
//!
//! See [`ProvisionError`] and [`ProvisionErrorKind`] for details.
use std::fmt::Display;

/// Main error type for this crate.
///
/// Any error that reaches the install driver is a fatal stage: the run stops
/// and the operator is shown [`ProvisionError::remediation()`] when available.
#[derive(Debug, thiserror::Error)]
pub struct ProvisionError {
    kind: ProvisionErrorKind,
    context: String,
    source: Option<Box<dyn std::error::Error + 'static + Send + Sync>>,
}

impl ProvisionError {
    /// Creates a new error with the given error kind.
    pub fn new(kind: ProvisionErrorKind) -> Self {
        Self {
            kind,
            context: String::new(),
            source: None,
        }
    }

    /// Adds a source error.
    pub fn with_source<S>(mut self, source: S) -> Self
    where
        S: std::error::Error + 'static + Send + Sync,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Adds a string with a contextual description of the error.
    pub fn with_context<C>(mut self, value: C) -> Self
    where
        C: AsRef<str>,
    {
        if !self.context.is_empty() {
            self.context.push_str(": ");
        }
        self.context.push_str(value.as_ref());
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> &ProvisionErrorKind {
        &self.kind
    }

    /// Returns the contextual description.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Returns whether the error kind is [`ProvisionErrorKind::Io`].
    pub fn is_io(&self) -> bool {
        self.as_io().is_some()
    }

    /// Returns a reference to the IO error when the kind is [`ProvisionErrorKind::Io`].
    pub fn as_io(&self) -> Option<&std::io::Error> {
        if self.kind.is_io() {
            if let Some(source) = &self.source {
                if let Some(error) = source.downcast_ref() {
                    return Some(error);
                }
            }
        }
        None
    }

    /// Returns an operator-facing hint on how to recover, if there is one.
    pub fn remediation(&self) -> Option<&'static str> {
        self.kind.remediation()
    }
}

impl Display for ProvisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.context.is_empty() {
            f.write_str(&self.context)?;
            f.write_str(": ")?;
        }

        self.kind.fmt(f)?;

        Ok(())
    }
}

impl From<ProvisionErrorKind> for ProvisionError {
    fn from(value: ProvisionErrorKind) -> Self {
        Self::new(value)
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(value: std::io::Error) -> Self {
        Self::new(ProvisionErrorKind::Io).with_source(value)
    }
}

impl From<tempfile::PersistError> for ProvisionError {
    fn from(value: tempfile::PersistError) -> Self {
        Self::new(ProvisionErrorKind::Io).with_source(value.error)
    }
}

impl From<AdditionalContext> for ProvisionError {
    fn from(value: AdditionalContext) -> Self {
        Self::new(ProvisionErrorKind::Other).with_source(value)
    }
}

/// Error category for [`ProvisionError`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProvisionErrorKind {
    /// Input/Output error usually from [`std::io::Error`].
    #[error("input/output error")]
    Io,

    /// Invalid input or argument type to a function.
    #[error("invalid input or argument")]
    InvalidInput,

    /// The [`crate::app::AppProfile`] has an invalid value or could not be parsed.
    #[error("invalid application profile")]
    InvalidProfile,

    /// The [`crate::receipt::InstallReceipt`] could not be parsed.
    #[error("malformed install receipt")]
    MalformedReceipt,

    /// No runtime meeting the minimum version could be found.
    #[error("no suitable Python runtime found")]
    RuntimeNotFound,

    /// The package manager used to install a runtime is missing.
    #[error("package manager unavailable")]
    PackageManagerUnavailable,

    /// The package manager ran but did not install the runtime.
    #[error("runtime installation failed")]
    RuntimeInstallFailed,

    /// The isolated environment could not be created.
    #[error("environment creation failed")]
    EnvironmentCreation,

    /// A package failed to install into the environment.
    #[error("dependency installation failed")]
    DependencyInstall,

    /// Installed packages could not be imported.
    #[error("dependency verification failed")]
    DependencyVerification,

    /// Internal console/terminal library returned an error.
    #[error("console/terminal error")]
    Terminal,

    /// Any other error.
    #[error("other")]
    Other,
}

impl ProvisionErrorKind {
    /// Returns whether it is the Io variant.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io)
    }

    /// Returns the remediation hint for fatal stage kinds.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeNotFound | Self::PackageManagerUnavailable | Self::RuntimeInstallFailed => {
                Some("install Python 3.8 or newer from https://www.python.org/downloads/ and run setup again")
            }
            Self::EnvironmentCreation => Some(
                "delete the environment directory and run setup again, or check that the Python installation includes the venv module",
            ),
            Self::DependencyInstall | Self::DependencyVerification => Some(
                "check the network connection and run setup again; the environment will be reused",
            ),
            _ => None,
        }
    }
}

/// Modify `Result<T, ProvisionError>` with context.
pub trait AddProvisionContext<T> {
    /// Add context using the given string when Err.
    fn prov_context<C>(self, context: C) -> Result<T, ProvisionError>
    where
        C: AsRef<str>;

    /// Add context using the evaluated function when Err.
    fn prov_contextc<C, CT>(self, context: C) -> Result<T, ProvisionError>
    where
        C: FnOnce() -> CT,
        CT: AsRef<str>;
}

impl<T> AddProvisionContext<T> for Result<T, ProvisionError> {
    fn prov_context<C>(self, context: C) -> Result<T, ProvisionError>
    where
        C: AsRef<str>,
    {
        self.map_err(|error| error.with_context(context.as_ref()))
    }

    fn prov_contextc<C, CT>(self, context: C) -> Result<T, ProvisionError>
    where
        C: FnOnce() -> CT,
        CT: AsRef<str>,
    {
        self.map_err(|error| error.with_context(context().as_ref()))
    }
}

/// Contains a contextual description of an error.
///
/// This isn't a real error, but allows injecting context in the error stack.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AdditionalContext {
    message: String,
    #[source]
    source: Box<dyn std::error::Error + Sync + Send + 'static>,
}

impl AdditionalContext {
    /// Creates a new context error with the given message and source error.
    pub fn new<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        Self {
            message,
            source: Box::new(source),
        }
    }
}

/// Trait for wrapping errors in Result with descriptive context strings.
pub trait AddContext<T, E, A> {
    /// Map the error with an error containing the context string.
    fn with_context<C>(self, context: C) -> Result<T, A>
    where
        C: Into<String>;

    /// Map the error with an error containing the context string evaluated from a function.
    fn with_contextc<C, CT>(self, context: C) -> Result<T, A>
    where
        C: FnOnce(&E) -> CT,
        CT: Into<String>;
}

impl<T, E> AddContext<T, E, AdditionalContext> for Result<T, E>
where
    E: std::error::Error + Sync + Send + 'static,
{
    fn with_context<C>(self, context: C) -> Result<T, AdditionalContext>
    where
        C: Into<String>,
    {
        self.map_err(|error| AdditionalContext::new(context.into(), error))
    }

    fn with_contextc<C, CT>(self, context: C) -> Result<T, AdditionalContext>
    where
        C: FnOnce(&E) -> CT,
        CT: Into<String>,
    {
        self.map_err(|error| AdditionalContext::new(context(&error).into(), error))
    }
}

/// Formats the error and each of its sources on separate lines.
pub fn format_error<E>(error: E) -> String
where
    E: std::error::Error,
{
    let mut buf = error.to_string();

    let mut error: Box<&dyn std::error::Error> = Box::new(&error);

    while let Some(source) = error.source() {
        error = Box::new(source);
        buf.push_str("\n↳");
        buf.push_str(&error.to_string());
    }

    buf
}

/// A message-only error used as a source for tool failures.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ToolMessage(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain() {
        let error = ProvisionError::new(ProvisionErrorKind::DependencyInstall)
            .with_context("PyQt5")
            .with_context("installing packages");

        assert_eq!(error.context(), "PyQt5: installing packages");
        assert_eq!(
            error.to_string(),
            "PyQt5: installing packages: dependency installation failed"
        );
        assert!(error.remediation().is_some());
    }

    #[test]
    fn test_format_error_sources() {
        let error = ProvisionError::new(ProvisionErrorKind::DependencyVerification)
            .with_source(ToolMessage("No module named 'PIL'".to_string()));

        let text = format_error(error);

        assert!(text.starts_with("dependency verification failed"));
        assert!(text.ends_with("↳No module named 'PIL'"));
    }

    #[test]
    fn test_io_error() {
        let error: ProvisionError = std::io::Error::other("disk full").into();

        assert!(error.is_io());
        assert!(error.remediation().is_none());
    }
}
