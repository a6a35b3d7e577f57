use crate::module::LifecycleHook;

/// Result alias that carries the custom [`PipelineError`] type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A module with the same name is already registered. The registry is
    /// left untouched.
    #[error("a module named `{0}` is already registered")]
    DuplicateModuleName(String),
    /// The capture device bound to the render surface could not be opened.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
    /// A control call was made before the state it depends on exists.
    #[error("pipeline not ready: {0}")]
    NotReady(&'static str),
    /// A module hook reported an error during dispatch.
    #[error("module `{module}` failed in {event}: {message}")]
    ModuleHookFailure {
        module: String,
        event: LifecycleHook,
        message: String,
    },
    /// One of the frame or scene renderers failed to draw.
    #[error("render failed: {0}")]
    Render(String),
    /// Configuration could not be parsed or serialised.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Free-form error for collaborators that have no dedicated variant.
    #[error("{0}")]
    Message(String),
}

impl PipelineError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for PipelineError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PipelineError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Error returned by a module hook. Hooks report failures with a message;
/// the dispatcher isolates them and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HookError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for HookError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Outcome of a single hook invocation.
pub type HookResult = std::result::Result<(), HookError>;
