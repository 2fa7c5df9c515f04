use std::fmt;

#[derive(Debug)]
pub enum GitVisionError {
    IoError(std::io::Error),
    /// Errors from invoking the git CLI that exited with a non-zero status
    GitCliError {
        code: Option<i32>,
        stderr: String,
        args: Vec<String>,
    },
    /// No repository could be found at or above the given path
    NotARepository(String),
    JsonError(serde_json::Error),
    FromUtf8Error(std::string::FromUtf8Error),
    Generic(String),
}

impl fmt::Display for GitVisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitVisionError::IoError(e) => write!(f, "IO error: {}", e),
            GitVisionError::GitCliError { code, stderr, args } => match code {
                Some(c) => write!(
                    f,
                    "Git CLI ({}) failed with exit code {}: {}",
                    args.join(" "),
                    c,
                    stderr.trim_end()
                ),
                None => write!(f, "Git CLI ({}) failed: {}", args.join(" "), stderr.trim_end()),
            },
            GitVisionError::NotARepository(path) => {
                write!(f, "Not a git repository (or any parent): {}", path)
            }
            GitVisionError::JsonError(e) => write!(f, "JSON error: {}", e),
            GitVisionError::FromUtf8Error(e) => write!(f, "From UTF-8 error: {}", e),
            GitVisionError::Generic(e) => write!(f, "Generic error: {}", e),
        }
    }
}

impl std::error::Error for GitVisionError {}

impl From<std::io::Error> for GitVisionError {
    fn from(err: std::io::Error) -> Self {
        GitVisionError::IoError(err)
    }
}

impl From<serde_json::Error> for GitVisionError {
    fn from(err: serde_json::Error) -> Self {
        GitVisionError::JsonError(err)
    }
}

impl From<std::string::FromUtf8Error> for GitVisionError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        GitVisionError::FromUtf8Error(err)
    }
}

impl Clone for GitVisionError {
    fn clone(&self) -> Self {
        match self {
            GitVisionError::IoError(e) => {
                GitVisionError::IoError(std::io::Error::new(e.kind(), e.to_string()))
            }
            GitVisionError::GitCliError { code, stderr, args } => GitVisionError::GitCliError {
                code: *code,
                stderr: stderr.clone(),
                args: args.clone(),
            },
            GitVisionError::NotARepository(p) => GitVisionError::NotARepository(p.clone()),
            GitVisionError::JsonError(e) => GitVisionError::Generic(format!("JSON error: {}", e)),
            GitVisionError::FromUtf8Error(e) => GitVisionError::FromUtf8Error(e.clone()),
            GitVisionError::Generic(s) => GitVisionError::Generic(s.clone()),
        }
    }
}
