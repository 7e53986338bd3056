// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! A single error type used throughout the workspace.
//!
//! `ErrorKind` borrows the taxonomy gRPC uses for status codes: it's a small,
//! general-purpose classification that every layer (registry, watchlist store,
//! web) can map onto without inventing its own error enum.

use std::fmt::{self, Write};

/// Error kind. See
/// [grpc::StatusCode](https://github.com/grpc/grpc/blob/master/include/grpcpp/impl/codegen/status_code_enum.h)
/// for a description of each.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Unknown => "Unknown",
            ErrorKind::InvalidArgument => "Invalid argument",
            ErrorKind::DeadlineExceeded => "Deadline exceeded",
            ErrorKind::NotFound => "Not found",
            ErrorKind::AlreadyExists => "Already exists",
            ErrorKind::PermissionDenied => "Permission denied",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::ResourceExhausted => "Resource exhausted",
            ErrorKind::FailedPrecondition => "Failed precondition",
            ErrorKind::Aborted => "Aborted",
            ErrorKind::OutOfRange => "Out of range",
            ErrorKind::Unimplemented => "Unimplemented",
            ErrorKind::Internal => "Internal",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::DataLoss => "Data loss",
        };
        f.write_str(s)
    }
}

pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: Some(message.into()),
            source: None,
        }
    }

    /// Wraps a foreign error, annotating it with `kind` and a context message.
    pub fn wrap<E>(source: E, kind: ErrorKind, message: impl Into<String>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error {
            kind,
            message: Some(message.into()),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns a `Display`-able view of this error and its full cause chain,
    /// one line per cause, suitable for a top-level log message.
    pub fn chain(&self) -> Chain<'_> {
        Chain(self)
    }
}

pub struct Chain<'a>(&'a Error);

impl fmt::Display for Chain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut cause = self.0.source.as_ref().map(|e| e.as_ref() as &dyn std::error::Error);
        while let Some(c) = cause {
            write!(f, "\ncaused by: {c}")?;
            cause = c.source();
        }
        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.message {
            Some(m) => write!(f, "{}: {}", self.kind, m),
            None => fmt::Display::fmt(&self.kind, f),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        write!(&mut s, "{}", self.chain())?;
        f.write_str(&s)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            kind,
            message: None,
            source: None,
        }
    }
}

/// Extension methods for annotating a foreign `Result` with an `ErrorKind`.
pub trait ResultExt<T> {
    fn err_kind(self, kind: ErrorKind) -> Result<T, Error>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn err_kind(self, kind: ErrorKind) -> Result<T, Error> {
        self.map_err(|e| {
            let message = e.to_string();
            Error::wrap(e, kind, message)
        })
    }
}

/// Builds an [`Error`] with the given kind and a formatted message.
///
/// ```
/// use facetrack_base::{err, ErrorKind};
/// let e = err!(NotFound, "no such stream {}", "cam0");
/// assert_eq!(e.kind(), ErrorKind::NotFound);
/// ```
#[macro_export]
macro_rules! err {
    ($kind:ident, $fmt:expr) => {
        $crate::Error::new($crate::ErrorKind::$kind, format!($fmt))
    };
    ($kind:ident, $fmt:expr, $($arg:tt)+) => {
        $crate::Error::new($crate::ErrorKind::$kind, format!($fmt, $($arg)+))
    };
}

/// Like [`err!`], but returns immediately.
#[macro_export]
macro_rules! bail {
    ($($args:tt)+) => {
        return Err($crate::err!($($args)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let e = Error::new(ErrorKind::NotFound, "no such stream s1");
        assert_eq!(e.to_string(), "Not found: no such stream s1");
    }

    #[test]
    fn chain_includes_source() {
        #[derive(Debug)]
        struct Inner;
        impl fmt::Display for Inner {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("inner failure")
            }
        }
        impl std::error::Error for Inner {}

        let e = Error::wrap(Inner, ErrorKind::Internal, "loading watchlist");
        let chain = e.chain().to_string();
        assert!(chain.contains("Internal: loading watchlist"));
        assert!(chain.contains("caused by: inner failure"));
    }

    #[test]
    fn macros_build_expected_kind() {
        let e = err!(InvalidArgument, "bad bbox {}x{}", 1, 2);
        assert_eq!(e.kind(), ErrorKind::InvalidArgument);
        assert_eq!(e.to_string(), "Invalid argument: bad bbox 1x2");
    }
}
