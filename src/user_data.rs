//! User-data resolution for the build instance.
//!
//! User data can be supplied inline or via a file path. When both are set the
//! file content is used; the inline value acts as a fallback only.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while resolving user data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum UserDataError {
    /// Raised when a file path is empty or only whitespace.
    #[error("user-data file path must not be empty")]
    FilePathEmpty,
    /// Raised when reading the file fails.
    #[error("failed to read user-data file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Resolves the user data passed to the build instance.
///
/// Returns `None` when neither source yields a non-blank payload. The
/// returned payload preserves the original content.
///
/// # Errors
///
/// Returns [`UserDataError`] when the file path is blank or unreadable.
pub fn resolve_user_data(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<String>, UserDataError> {
    if let Some(path) = file {
        if path.trim().is_empty() {
            return Err(UserDataError::FilePathEmpty);
        }
        let expanded = expand_tilde(path.trim());
        let content =
            read_to_string_ambient(&expanded).map_err(|message| UserDataError::FileRead {
                path: expanded.clone(),
                message,
            })?;
        return Ok(non_blank(content));
    }

    Ok(inline.map(ToOwned::to_owned).and_then(non_blank))
}

fn non_blank(payload: String) -> Option<String> {
    if payload.trim().is_empty() {
        None
    } else {
        Some(payload)
    }
}

fn expand_tilde(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{home}/{rest}"),
        _ => path.to_owned(),
    }
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}
