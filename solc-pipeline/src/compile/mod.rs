use crate::{
    artifacts::{CompilerInput, CompilerOutput},
    error::{Result, SolcError},
};
use semver::Version;
use std::{
    fmt,
    io::BufRead,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

pub mod output;
pub mod project;
pub mod provider;
pub mod scripted;

pub use output::{compile, link_placeholders};
pub use project::{BuildContext, BuildState, ProjectCompileOutput, ProjectCompiler};
pub use provider::CompilerProvider;
pub use scripted::ScriptedSolc;

/// The name of the `solc` binary on the system
pub const SOLC: &str = "solc";

/// Support for configuring the EVM version
/// <https://blog.soliditylang.org/2018/03/08/solidity-0.4.21-release-announcement/>
pub const BYZANTIUM_SOLC: Version = Version::new(0, 4, 21);

/// Bug fix for configuring the EVM version with Constantinople
/// <https://blog.soliditylang.org/2018/03/08/solidity-0.4.21-release-announcement/>
pub const CONSTANTINOPLE_SOLC: Version = Version::new(0, 4, 22);

/// Petersburg support
/// <https://blog.soliditylang.org/2019/03/05/solidity-0.5.5-release-announcement/>
pub const PETERSBURG_SOLC: Version = Version::new(0, 5, 5);

/// Istanbul support
/// <https://blog.soliditylang.org/2019/12/09/solidity-0.5.14-release-announcement/>
pub const ISTANBUL_SOLC: Version = Version::new(0, 5, 14);

/// Berlin support
/// <https://blog.soliditylang.org/2021/06/10/solidity-0.8.5-release-announcement/>
pub const BERLIN_SOLC: Version = Version::new(0, 8, 5);

/// London support
/// <https://blog.soliditylang.org/2021/08/11/solidity-0.8.7-release-announcement/>
pub const LONDON_SOLC: Version = Version::new(0, 8, 7);

/// Paris support
/// <https://blog.soliditylang.org/2023/02/01/solidity-0.8.18-release-announcement/>
pub const PARIS_SOLC: Version = Version::new(0, 8, 18);

/// Shanghai support
/// <https://blog.soliditylang.org/2023/05/10/solidity-0.8.20-release-announcement/>
pub const SHANGHAI_SOLC: Version = Version::new(0, 8, 20);

/// A compiler that understands standard-json input.
///
/// Implemented by a native [Solc] executable and by the emscripten build run through a
/// javascript runtime, [ScriptedSolc].
pub trait CompilerHandle: fmt::Debug + Send + Sync {
    /// The long version of the compiler, `0.5.9+commit.e560f70d`
    fn version(&self) -> Result<String>;

    /// Compiles the input and returns the raw standard-json output
    fn compile_output(&self, input: &CompilerInput) -> Result<Vec<u8>>;

    /// Compiles the input and deserializes the standard-json output
    fn compile(&self, input: &CompilerInput) -> Result<CompilerOutput> {
        let output = self.compile_output(input)?;
        Ok(serde_json::from_slice(&output)?)
    }
}

/// A native `solc` executable
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord)]
pub struct Solc {
    /// Path to the `solc` executable
    pub solc: PathBuf,
    /// The long version, if it is already known, `--version` is not invoked then
    pub long_version: Option<String>,
}

impl Default for Solc {
    fn default() -> Self {
        if let Ok(solc) = std::env::var(crate::config::SOLC_PATH_ENV) {
            return Solc::new(solc)
        }
        Solc::new(SOLC)
    }
}

impl fmt::Display for Solc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.solc.display())
    }
}

impl Solc {
    /// A new instance which points to `solc`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Solc { solc: path.into(), long_version: None }
    }

    /// Sets the known long version of the executable
    #[must_use]
    pub fn with_long_version(mut self, long_version: impl Into<String>) -> Self {
        self.long_version = Some(long_version.into());
        self
    }

    /// Runs `solc --version` and returns the normalized long version
    pub fn probe_version(&self) -> Result<String> {
        version_from_output(
            Command::new(&self.solc)
                .arg("--version")
                .stdin(Stdio::piped())
                .stderr(Stdio::piped())
                .stdout(Stdio::piped())
                .output()
                .map_err(|err| SolcError::io(err, &self.solc))?,
        )
    }
}

impl CompilerHandle for Solc {
    fn version(&self) -> Result<String> {
        match self.long_version {
            Some(ref version) => Ok(version.clone()),
            None => self.probe_version(),
        }
    }

    fn compile_output(&self, input: &CompilerInput) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.solc)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| SolcError::io(err, &self.solc))?;
        let stdin = child.stdin.take().ok_or_else(|| SolcError::solc("failed to open stdin"))?;
        serde_json::to_writer(stdin, input)?;
        compile_output(child.wait_with_output().map_err(|err| SolcError::io(err, &self.solc))?)
    }
}

impl AsRef<Path> for Solc {
    fn as_ref(&self) -> &Path {
        &self.solc
    }
}

impl<T: Into<PathBuf>> From<T> for Solc {
    fn from(solc: T) -> Self {
        Solc::new(solc)
    }
}

pub(crate) fn compile_output(output: Output) -> Result<Vec<u8>> {
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(SolcError::solc(String::from_utf8_lossy(&output.stderr).to_string()))
    }
}

fn version_from_output(output: Output) -> Result<String> {
    if output.status.success() {
        let version = output
            .stdout
            .lines()
            .map_while(std::result::Result::ok)
            .filter(|l| !l.trim().is_empty())
            .last()
            .ok_or_else(|| SolcError::solc("version not found in solc output"))?;
        Ok(normalize_long_version(&version))
    } else {
        Err(SolcError::solc(String::from_utf8_lossy(&output.stderr).to_string()))
    }
}

/// Strips the platform suffix from a reported compiler version, so it can be compared with the
/// long version of a published build.
///
/// `Version: 0.5.9+commit.e560f70d.Linux.g++` => `0.5.9+commit.e560f70d`
pub fn normalize_long_version(version: &str) -> String {
    let version = version.trim().trim_start_matches("Version:").trim();
    match version.split_once('+') {
        Some((base, meta)) if meta.starts_with("commit.") => {
            let commit = meta.split('.').take(2).collect::<Vec<_>>().join(".");
            format!("{base}+{commit}")
        }
        _ => version.to_string(),
    }
}

/// The `major.minor.patch` part of a long version
///
/// `0.4.1-nightly.2016.9.9+commit.79867f49` => `0.4.1`
pub fn version_short(long_version: &str) -> Result<Version> {
    let base = long_version.trim().split(['-', '+']).next().unwrap_or_default();
    let version = Version::parse(base)?;
    Ok(Version::new(version.major, version.minor, version.patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_normalize_long_version() {
        assert_eq!(
            normalize_long_version("Version: 0.5.9+commit.e560f70d.Linux.g++"),
            "0.5.9+commit.e560f70d"
        );
        assert_eq!(
            normalize_long_version("0.4.1-nightly.2016.9.9+commit.79867f49.Darwin.appleclang"),
            "0.4.1-nightly.2016.9.9+commit.79867f49"
        );
        assert_eq!(normalize_long_version("0.8.20+commit.a1b79de6"), "0.8.20+commit.a1b79de6");
        assert_eq!(normalize_long_version("0.8.20"), "0.8.20");
    }

    #[test]
    fn can_shorten_version() {
        assert_eq!(version_short("0.4.1-nightly.2016.9.9+commit.79867f49").unwrap(), Version::new(0, 4, 1));
        assert_eq!(version_short("0.8.20+commit.a1b79de6").unwrap(), Version::new(0, 8, 20));
        assert!(version_short("latest").is_err());
    }

    #[test]
    fn known_version_is_not_probed() {
        let solc = Solc::new("/does/not/exist").with_long_version("0.5.9+commit.e560f70d");
        assert_eq!(solc.version().unwrap(), "0.5.9+commit.e560f70d");
        assert!(solc.probe_version().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn can_run_native_executable() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("solc");
        let script = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "solc, the solidity compiler commandline interface"
  echo "Version: 0.5.9+commit.e560f70d.Linux.g++"
  exit 0
fi
cat > /dev/null
echo '{"errors":[{"severity":"warning","message":"w","type":"Warning","component":"general"}]}'
"#;
        crate::utils::write_atomic_executable(&exe, script.as_bytes()).unwrap();

        let solc = Solc::new(&exe);
        assert_eq!(solc.version().unwrap(), "0.5.9+commit.e560f70d");

        let input = CompilerInput::new(Default::default(), Default::default());
        let output = solc.compile(&input).unwrap();
        assert_eq!(output.errors.len(), 1);
        assert!(!output.has_error());
    }

    #[test]
    fn missing_executable_is_io_error() {
        let solc = Solc::new("/does/not/exist/solc");
        let input = CompilerInput::new(Default::default(), Default::default());
        assert!(matches!(solc.compile(&input), Err(SolcError::Io(_))));
    }
}
