use std::path::PathBuf;

/// Errors that can occur while comparing two points of pipeline history.
///
/// Each variant is one failure kind of the comparison engine. Library crates
/// use this type directly; the binary renders it through `miette` at the
/// boundary.
///
/// # Examples
///
/// ```
/// use stagedrift_core::DriftError;
///
/// let err = DriftError::CheckoutFailed {
///     reference: "deadbeef".into(),
///     detail: "unknown revision".into(),
/// };
/// assert!(err.is_fatal());
/// assert!(err.to_string().contains("deadbeef"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DriftError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(stagedrift::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(stagedrift::config))]
    Config(String),

    /// Clone, rev-parse or log failure in the version-control provider.
    #[error("git error: {0}")]
    #[diagnostic(code(stagedrift::git))]
    Git(String),

    /// The reference could not be checked out in the workspace.
    #[error("checkout of '{reference}' failed: {detail}")]
    #[diagnostic(
        code(stagedrift::checkout_failed),
        help("make sure the commit or branch exists in the source repository")
    )]
    CheckoutFailed {
        /// Reference that failed to resolve.
        reference: String,
        /// Provider output explaining the failure.
        detail: String,
    },

    /// The pipeline description file is absent.
    #[error("pipeline spec not found: {}", .0.display())]
    #[diagnostic(
        code(stagedrift::spec_not_found),
        help("set [pipeline] spec_file in .stagedrift.toml if the pipeline file has another name")
    )]
    SpecNotFound(PathBuf),

    /// The pipeline description file does not have the expected structure.
    #[error("malformed pipeline spec {}: {detail}", .path.display())]
    #[diagnostic(code(stagedrift::spec_malformed))]
    SpecMalformed {
        /// Path of the pipeline description.
        path: PathBuf,
        /// Parser message.
        detail: String,
    },

    /// The data-versioning cache could not be pulled.
    #[error("cache pull failed: {0}")]
    #[diagnostic(code(stagedrift::cache_unavailable))]
    CacheUnavailable(String),

    /// A declared file is absent at a reference.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(stagedrift::file_missing))]
    FileMissing(PathBuf),

    /// A table could not be parsed.
    #[error("failed to parse {}: {detail}", .path.display())]
    #[diagnostic(code(stagedrift::parse_failure))]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Parser message.
        detail: String,
    },

    /// The numeric diff for a single code dependency is unavailable.
    #[error("diff unavailable for {path}: {detail}")]
    #[diagnostic(code(stagedrift::diff_unavailable))]
    DiffUnavailable {
        /// Code dependency path.
        path: String,
        /// Provider output explaining the failure.
        detail: String,
    },

    /// An external tool did not finish within the configured bound.
    #[error("'{tool}' timed out after {timeout_secs}s")]
    #[diagnostic(
        code(stagedrift::external_tool_timeout),
        help("raise [tools] timeout_secs in .stagedrift.toml, or retry")
    )]
    ExternalToolTimeout {
        /// Program name.
        tool: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(stagedrift::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(stagedrift::toml))]
    Toml(#[from] toml::de::Error),
}

impl DriftError {
    /// Returns `true` for kinds that abort a whole comparison.
    ///
    /// Cache, missing-file, parse and single-diff failures are recovered
    /// where they happen and never abort the comparison.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DriftError::CacheUnavailable(_)
                | DriftError::FileMissing(_)
                | DriftError::Parse { .. }
                | DriftError::DiffUnavailable { .. }
        )
    }

    /// Returns `true` when retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriftError::ExternalToolTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DriftError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = DriftError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn spec_not_found_shows_path() {
        let err = DriftError::SpecNotFound(PathBuf::from("/tmp/repo/dvc.yaml"));
        assert!(err.to_string().contains("/tmp/repo/dvc.yaml"));
        assert!(err.is_fatal());
    }

    #[test]
    fn recoverable_kinds_are_not_fatal() {
        assert!(!DriftError::CacheUnavailable("offline".into()).is_fatal());
        assert!(!DriftError::FileMissing(PathBuf::from("a.csv")).is_fatal());
        assert!(!DriftError::Parse {
            path: PathBuf::from("a.csv"),
            detail: "bad row".into(),
        }
        .is_fatal());
        assert!(!DriftError::DiffUnavailable {
            path: "train.py".into(),
            detail: "exit 128".into(),
        }
        .is_fatal());
    }

    #[test]
    fn only_timeouts_are_retryable() {
        let timeout = DriftError::ExternalToolTimeout {
            tool: "dvc".into(),
            timeout_secs: 5,
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.to_string(), "'dvc' timed out after 5s");
        assert!(!DriftError::Git("clone failed".into()).is_retryable());
    }
}
