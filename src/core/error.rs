use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    NotFound,
    NotEmpty,
    ProtectedPolicy,
    Transport,
    Registry,
}

/// What an error's identifier refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntityKind {
    Host,
    User,
    Group,
    Policy,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Host => "host",
            EntityKind::User => "user",
            EntityKind::Group => "group",
            EntityKind::Policy => "policy",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    host: Option<String>,
    entity: Option<(EntityKind, String)>,
    status: Option<u16>,
    code: Option<String>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            host: None,
            entity: None,
            status: None,
            code: None,
            path: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn entity(&self) -> Option<(EntityKind, &str)> {
        self.entity.as_ref().map(|(kind, id)| (*kind, id.as_str()))
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Error code reported by the storage service, when it sent one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_entity(mut self, kind: EntityKind, id: impl Into<String>) -> Self {
        self.entity = Some((kind, id.into()));
        self
    }

    /// Attach entity context unless a more specific entity is already set.
    pub fn or_entity(self, kind: EntityKind, id: impl Into<String>) -> Self {
        if self.entity.is_some() {
            return self;
        }
        self.with_entity(kind, id)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some((kind, id)) = &self.entity {
            write!(f, " ({kind}: {id})")?;
        }
        if let Some(host) = &self.host {
            write!(f, " (host: {host})")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Transport => 1,
        ErrorKind::NotFound => 3,
        ErrorKind::NotEmpty => 4,
        ErrorKind::ProtectedPolicy => 5,
        ErrorKind::Registry => 6,
    }
}
