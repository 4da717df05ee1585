//! Load-time error taxonomy.

/// What went wrong while loading a game definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    /// YAML was not parseable at all.
    Parse,
    /// Structure violated the game schema.
    Schema,
    /// A named type/behavior/action/sprite/sound does not resolve.
    MissingReference,
    /// `extends` chains do not terminate.
    ExtendCycle,
    /// A behavior/action/generator failed to compile in the sandbox.
    ScriptCompile,
}

impl std::fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadErrorKind::Parse => "parse error",
            LoadErrorKind::Schema => "schema error",
            LoadErrorKind::MissingReference => "missing reference",
            LoadErrorKind::ExtendCycle => "extend cycle",
            LoadErrorKind::ScriptCompile => "script compile error",
        };
        f.write_str(s)
    }
}

/// Fatal error at session start. Carries the definition path (virtual
/// path or a `path.to.field` locator within the document) so the message
/// is actionable without a debugger.
#[derive(Debug, thiserror::Error)]
#[error("{kind} at {path}: {message}")]
pub struct LoadError {
    pub kind: LoadErrorKind,
    pub path: String,
    pub message: String,
}

impl LoadError {
    pub fn new(kind: LoadErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LoadErrorKind::Schema, path, message)
    }

    pub fn missing(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LoadErrorKind::MissingReference, path, message)
    }
}
