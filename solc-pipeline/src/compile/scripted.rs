//! Support for the emscripten `soljson` builds

use crate::{
    artifacts::CompilerInput,
    compile::{compile_output, CompilerHandle},
    error::{Result, SolcError},
};
use std::{
    fmt,
    path::PathBuf,
    process::{Command, Stdio},
};

/// Loads the `soljson` module given as first argument and answers the standard-json input read
/// from stdin.
///
/// Newer builds export `solidity_compile`, builds before 0.5 only `compileStandard`.
const WRAPPER: &str = r#"
const soljson = require(process.argv[1]);
let input = '';
process.stdin.setEncoding('utf8');
process.stdin.on('data', (chunk) => { input += chunk; });
process.stdin.on('end', () => {
  let output;
  if ('_solidity_compile' in soljson) {
    output = soljson.cwrap('solidity_compile', 'string', ['string', 'number', 'number'])(input, 0, 0);
  } else if ('_compileStandard' in soljson) {
    output = soljson.cwrap('compileStandard', 'string', ['string', 'number'])(input, 0);
  } else {
    process.stderr.write('soljson build does not support standard-json');
    process.exit(1);
  }
  process.stdout.write(output);
});
"#;

/// An emscripten `soljson` build, run inside a javascript runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedSolc {
    /// the javascript runtime, `node`
    pub runtime: PathBuf,
    /// absolute path to the `soljson-*.js` build
    pub soljson: PathBuf,
    /// long version of the build
    pub long_version: String,
}

impl ScriptedSolc {
    pub fn new(
        runtime: impl Into<PathBuf>,
        soljson: impl Into<PathBuf>,
        long_version: impl Into<String>,
    ) -> Self {
        Self { runtime: runtime.into(), soljson: soljson.into(), long_version: long_version.into() }
    }
}

impl fmt::Display for ScriptedSolc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.runtime.display(), self.soljson.display())
    }
}

impl CompilerHandle for ScriptedSolc {
    fn version(&self) -> Result<String> {
        Ok(self.long_version.clone())
    }

    fn compile_output(&self, input: &CompilerInput) -> Result<Vec<u8>> {
        tracing::trace!("running {} through {}", self.soljson.display(), self.runtime.display());
        let mut child = Command::new(&self.runtime)
            .arg("-e")
            .arg(WRAPPER)
            .arg(&self.soljson)
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| SolcError::io(err, &self.runtime))?;
        let stdin = child.stdin.take().ok_or_else(|| SolcError::solc("failed to open stdin"))?;
        serde_json::to_writer(stdin, input)?;
        compile_output(child.wait_with_output().map_err(|err| SolcError::io(err, &self.runtime))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_the_release_version() {
        let solc = ScriptedSolc::new("node", "/cache/bin/soljson.js", "0.4.24+commit.e67f0147");
        assert_eq!(solc.version().unwrap(), "0.4.24+commit.e67f0147");
    }

    #[cfg(unix)]
    #[test]
    fn passes_build_and_input_to_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = tmp.path().join("node");
        // echoes the module argument so we can check how the runtime is invoked
        let script = r#"#!/bin/sh
cat > /dev/null
printf '{"errors":[{"severity":"error","message":"%s","type":"Test","component":"general"}]}' "$3"
"#;
        crate::utils::write_atomic_executable(&runtime, script.as_bytes()).unwrap();

        let solc = ScriptedSolc::new(&runtime, "/cache/bin/soljson.js", "0.4.24+commit.e67f0147");
        let input = CompilerInput::new(Default::default(), Default::default());
        let output = solc.compile(&input).unwrap();
        assert_eq!(output.errors[0].message, "/cache/bin/soljson.js");
    }

    #[test]
    fn missing_runtime_is_io_error() {
        let solc = ScriptedSolc::new("/does/not/exist/node", "soljson.js", "0.4.24");
        let input = CompilerInput::new(Default::default(), Default::default());
        assert!(matches!(solc.compile(&input), Err(SolcError::Io(_))));
    }
}
