use std::{error::Error, fmt::Display, sync::Arc};

/// Error reported by a unit through [`Control::fail`](crate::Control::fail).
///
/// Any unit failure shuts down every other unit. It is never retried.
#[derive(Debug, Clone)]
pub enum UnitError {
    /// The unit reported a failure itself.
    Failed(Arc<dyn Error + Send + Sync + 'static>),
    /// The unit's `run` future panicked before reporting anything.
    Panicked(String),
}

impl UnitError {
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Failed(Arc::new(error))
    }

    pub fn msg(msg: impl Into<String>) -> Self {
        Self::Failed(Arc::new(Message(msg.into())))
    }

    /// Short stable label for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            UnitError::Failed(_) => "unit_failed",
            UnitError::Panicked(_) => "unit_panicked",
        }
    }
}

impl Error for UnitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            UnitError::Failed(err) => Some(err.as_ref()),
            UnitError::Panicked(_) => None,
        }
    }
}

impl Display for UnitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitError::Failed(err) => Display::fmt(err, f),
            UnitError::Panicked(msg) => write!(f, "unit panicked: {msg}"),
        }
    }
}

impl From<&str> for UnitError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for UnitError {
    fn from(value: String) -> Self {
        Self::msg(value)
    }
}

impl From<std::io::Error> for UnitError {
    fn from(value: std::io::Error) -> Self {
        Self::new(value)
    }
}

impl From<Box<dyn Error + Send + Sync + 'static>> for UnitError {
    fn from(value: Box<dyn Error + Send + Sync + 'static>) -> Self {
        Self::Failed(Arc::from(value))
    }
}

#[derive(Debug)]
struct Message(String);

impl Error for Message {}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
