//! Validation of the command-line argument naming a sequence bag file.
//!
//! The check is purely syntactic. Nothing here touches the filesystem, so a
//! well-formed reference may still point at a file that does not exist.

use std::path::{is_separator, MAIN_SEPARATOR};

use thiserror::Error;

/// The only extension a sequence reference is allowed to carry.
pub const SEQUENCE_EXTENSION: &str = "bag";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("expected exactly one argument, got {0}")]
    WrongArgumentCount(usize),
    #[error("argument `{0}` looks like an option, not a path")]
    LooksLikeFlag(String),
    #[error("argument `{0}` must name both a directory and a file")]
    MissingDirectoryOrName(String),
    #[error("expected a .bag file, got extension `{0}`")]
    WrongExtension(String),
}

/// A sequence bag file split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathReference {
    directory: String,
    base_name: String,
    extension: String,
}

pub type ValidationResult = Result<PathReference, Rejection>;

impl PathReference {
    /// Containing folder, always ending with a single path separator.
    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Lower-cased, without the leading dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// Splits `path` into `(directory, base_name, extension)`.
///
/// The directory keeps its trailing separator. The extension is lower-cased
/// and empty when the file name has no dot.
pub fn split_path(path: &str) -> (&str, &str, String) {
    let name_start = path.rfind(is_separator).map(|i| i + 1).unwrap_or(0);

    let (directory, file_name) = path.split_at(name_start);

    match file_name.rfind('.') {
        Some(dot) => (
            directory,
            &file_name[..dot],
            file_name[dot + 1..].to_lowercase(),
        ),
        None => (directory, file_name, String::new()),
    }
}

/// Decides whether `args` (program name excluded) hold exactly one usable
/// reference to a sequence bag file, and decomposes it.
pub fn resolve<S: AsRef<str>>(args: &[S]) -> ValidationResult {
    let arg = match args {
        [single] => single.as_ref(),
        _ => return Err(Rejection::WrongArgumentCount(args.len())),
    };

    if arg.starts_with('-') {
        return Err(Rejection::LooksLikeFlag(arg.to_string()));
    }

    let (directory, base_name, extension) = split_path(arg);

    if directory.is_empty() || base_name.is_empty() {
        return Err(Rejection::MissingDirectoryOrName(arg.to_string()));
    }

    if extension != SEQUENCE_EXTENSION {
        return Err(Rejection::WrongExtension(extension));
    }

    let mut directory = directory.to_string();
    if !directory.ends_with(is_separator) {
        directory.push(MAIN_SEPARATOR);
    }

    Ok(PathReference {
        directory,
        base_name: base_name.to_string(),
        extension,
    })
}
