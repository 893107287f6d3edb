use err_derive::Error;
use std::fmt::Debug;

/// Errors that abort judging of a whole work item.
///
/// None of these reach the caller of [`crate::judge::judge`] directly; they are
/// reported as a single `INTERNAL_ERROR` outcome instead.
#[derive(Debug, Error)]
pub enum JudgeErr {
    #[error(display = "Unsupported language: {}", _0)]
    UnsupportedLanguage(String),

    #[error(display = "Invalid work item: {}", _0)]
    InvalidWorkItem(String),

    #[error(display = "Invalid command `{}`: {}", _0, _1)]
    BadCommand(String, String),

    #[error(display = "Unsafe path: {}", _0)]
    UnsafePath(String),

    #[error(display = "IO error: {}", _0)]
    Io(#[error(source)] std::io::Error),

    #[error(display = "{:#}", _0)]
    Any(anyhow::Error),
}

impl From<anyhow::Error> for JudgeErr {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<std::io::Error>() {
            Ok(e) => JudgeErr::Io(e),
            Err(e) => JudgeErr::Any(e),
        }
    }
}
