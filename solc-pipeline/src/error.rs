use semver::Version;
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolcError>;

/// Various error types
#[derive(Debug, Error)]
pub enum SolcError {
    /// Internal solc error
    #[error("Solc Error: {0}")]
    SolcError(String),
    /// The compiler reported at least one diagnostic that is not a warning
    #[error("Compilation failed:\n{0}")]
    Compile(String),
    /// An import could not be located
    #[error(
        "Failed to resolve import \"{}\" from \"{}\" (search root \"{}\")",
        import.display(),
        importer.display(),
        root.display()
    )]
    FailedResolveImport { import: PathBuf, importer: PathBuf, root: PathBuf },
    /// No known release satisfies the requested version constraints
    #[error("Could not find a solc release satisfying [{}]", .0.join(", "))]
    VersionNotFound(Vec<String>),
    #[error("Invalid version requirement \"{req}\": {err}")]
    InvalidVersionReq { req: String, err: semver::Error },
    #[error("Failed to download \"{url}\": {msg}")]
    Download { url: String, msg: String },
    #[error("Checksum mismatch for {version}: expected {expected}, but found {detected} for {url}")]
    ChecksumMismatch { version: Version, expected: String, detected: String, url: String },
    #[error(transparent)]
    SemverError(#[from] semver::Error),
    /// Deserialization error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// Filesystem IO error
    #[error(transparent)]
    Io(#[from] SolcIoError),
    /// An existing artifact could not be read, nothing was deleted
    #[error("Failed to read existing artifact \"{}\": {err}", path.display())]
    InvalidArtifact { path: PathBuf, err: serde_json::Error },
}

impl SolcError {
    pub(crate) fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        SolcIoError::new(err, path).into()
    }
    pub(crate) fn solc(msg: impl Into<String>) -> Self {
        SolcError::SolcError(msg.into())
    }
    pub(crate) fn download(url: impl Into<String>, msg: impl ToString) -> Self {
        SolcError::Download { url: url.into(), msg: msg.to_string() }
    }

    /// Whether this is a failure to locate an import
    pub fn is_resolution_error(&self) -> bool {
        matches!(self, SolcError::FailedResolveImport { .. })
    }

    /// Whether no compiler release could be selected
    pub fn is_version_error(&self) -> bool {
        matches!(self, SolcError::VersionNotFound(_) | SolcError::InvalidVersionReq { .. })
    }

    /// Whether fetching a compiler build failed, either on the wire or during verification
    pub fn is_download_error(&self) -> bool {
        matches!(self, SolcError::Download { .. } | SolcError::ChecksumMismatch { .. })
    }
}

#[derive(Debug, Error)]
#[error("\"{}\": {io}", self.path.display())]
pub struct SolcIoError {
    io: io::Error,
    path: PathBuf,
}

impl SolcIoError {
    pub fn new(io: io::Error, path: impl Into<PathBuf>) -> Self {
        Self { io, path: path.into() }
    }

    /// The path at which the error occurred
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying `io::Error`
    pub fn io_error(&self) -> &io::Error {
        &self.io
    }
}

impl From<SolcIoError> for io::Error {
    fn from(err: SolcIoError) -> Self {
        err.io
    }
}
