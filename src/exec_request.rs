// Exec Request
//
// The execve call the generated program performs: pathname, argument vector
// and environment. The background-removal request drives curl against the
// upload endpoint with the image as a multipart form field.

use crate::config::RequestConfig;
use std::fmt;
use std::path::{Component, Path, PathBuf};

#[derive(Debug)]
pub enum InputError {
    NonUtf8Path(PathBuf),
    Path(PathBuf, String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InputError::NonUtf8Path(path) => {
                write!(f, "Path is not valid UTF-8: {}", path.display())
            }
            InputError::Path(path, msg) => {
                write!(f, "Cannot resolve path '{}': {}", path.display(), msg)
            }
        }
    }
}

impl std::error::Error for InputError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub path: String,
    pub argv: Vec<String>,
    pub envp: Vec<String>,
}

impl ExecRequest {
    /// Request with an empty environment
    pub fn new(path: impl Into<String>, argv: Vec<String>) -> Self {
        ExecRequest {
            path: path.into(),
            argv,
            envp: Vec::new(),
        }
    }

    /// `curl` upload of `image` to the background-removal API, saving the
    /// response body to `output`. Both paths are made absolute.
    pub fn background_removal(
        config: &RequestConfig,
        api_key: &str,
        image: &Path,
        output: &Path,
    ) -> Result<ExecRequest, InputError> {
        let image = absolute_utf8(image)?;
        let output = absolute_utf8(output)?;

        let argv = vec![
            "curl".to_string(),
            "-fsS".to_string(),
            "-v".to_string(),
            "-H".to_string(),
            format!("x-api-key: {}", api_key),
            "-F".to_string(),
            format!("image_file=@{}", image),
            config.endpoint.clone(),
            "-o".to_string(),
            output,
        ];

        Ok(ExecRequest::new(config.curl_path.clone(), argv))
    }
}

fn absolute_utf8(path: &Path) -> Result<String, InputError> {
    let absolute =
        std::path::absolute(path).map_err(|e| InputError::Path(path.to_path_buf(), e.to_string()))?;
    let absolute = normalize_lexically(&absolute);
    if let Some(text) = absolute.to_str() {
        return Ok(text.to_string());
    }
    Err(InputError::NonUtf8Path(absolute))
}

/// Fold `.` and `..` without touching the filesystem. `..` at the root
/// stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(
                    normalized.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    normalized.pop();
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
