use crate::{
    artifacts::Source,
    error::{Result, SolcError},
    resolver::parse::SolData,
    utils,
};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// A resolved solidity file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// The name under which solc sees this file: `contracts/Token.sol` for project files,
    /// `openzeppelin-solidity/contracts/math/SafeMath.sol` for dependency files
    pub logical_name: String,
    /// Absolute location on disk
    pub path: PathBuf,
    /// The dependency package this file was pulled from, `None` for project files
    pub package: Option<String>,
    /// content of the solidity file
    pub source: Source,
    pub last_modified: Option<SystemTime>,
    /// parsed data
    pub data: SolData,
}

impl SourceFile {
    /// Reads the content of the file and returns a [SourceFile] containing relevant information
    pub fn read(
        path: impl Into<PathBuf>,
        logical_name: impl Into<String>,
        package: Option<String>,
    ) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|err| SolcError::io(err, &path))?;
        let data = SolData::parse(&content, &path);
        Ok(Self {
            logical_name: logical_name.into(),
            last_modified: utils::last_modified(&path),
            path,
            package,
            source: Source::new(content),
            data,
        })
    }

    pub fn content(&self) -> &str {
        &self.source.content
    }

    pub fn imports(&self) -> &[PathBuf] {
        &self.data.imports
    }

    /// The raw version pragma of the file
    pub fn version(&self) -> Option<&str> {
        self.data.version.as_deref()
    }

    /// Whether this file belongs to the project itself rather than to a dependency package
    pub fn is_local(&self) -> bool {
        self.package.is_none()
    }

    /// The file name, `Token.sol`
    pub fn file_name(&self) -> String {
        self.path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.logical_name)?;
        if let Some(ref v) = self.data.version {
            write!(f, " {v}")?;
        }
        Ok(())
    }
}
