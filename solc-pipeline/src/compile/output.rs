//! Turning a set of resolved sources into compiled artifacts

use crate::{
    artifact_output::{CompiledArtifact, CompilerInfo},
    artifacts::{Bytecode, CompilerInput, LinkReferences, Settings},
    compile::CompilerHandle,
    error::{Result, SolcError},
    report,
    resolver::{self, SourceFile},
};
use serde_json::Value;
use std::collections::HashMap;

/// Compiles all files with a single compiler invocation.
///
/// Any diagnostic that is not a warning fails the compilation, warnings are logged. `version` is
/// the long version recorded in the artifacts.
#[tracing::instrument(skip_all, name = "compile", fields(files = files.len()))]
pub fn compile(
    files: &[SourceFile],
    settings: &Settings,
    handle: &dyn CompilerHandle,
    version: &str,
) -> Result<Vec<CompiledArtifact>> {
    let input = CompilerInput::new(resolver::to_sources(files), settings.clone());
    tracing::trace!("compiling {} files with {}", input.sources.len(), version);
    report::compiler_spawn(version, &input);
    let output = handle.compile(&input)?;

    for warning in output.warnings() {
        tracing::warn!("{}", warning.display_message());
    }
    if output.has_error() {
        let errors = output.fatal_errors().map(|err| err.display_message()).collect::<Vec<_>>();
        tracing::debug!("compilation failed with {} errors", errors.len());
        return Err(SolcError::Compile(errors.join("\n")))
    }
    report::compiler_success(version, &output);

    let files: HashMap<&str, &SourceFile> =
        files.iter().map(|file| (file.logical_name.as_str(), file)).collect();
    let compiler = CompilerInfo::new(version, settings);

    let mut artifacts = Vec::new();
    for (source_name, contracts) in output.contracts {
        let file = files.get(source_name.as_str());
        let ast = output.sources.get(&source_name).and_then(|s| s.ast.clone()).unwrap_or_default();
        for (contract_name, contract) in contracts {
            let evm = contract.evm.unwrap_or_default();
            let (bytecode, source_map) = linked(evm.bytecode);
            let (deployed_bytecode, deployed_source_map) = linked(evm.deployed_bytecode);
            artifacts.push(CompiledArtifact {
                contract_name,
                file_name: file.map(|f| f.file_name()).unwrap_or_else(|| file_name(&source_name)),
                source_path: file
                    .map(|f| f.path.display().to_string())
                    .unwrap_or_else(|| source_name.clone()),
                source: file.map(|f| f.content().to_string()).unwrap_or_default(),
                is_local: file.map(|f| f.is_local()).unwrap_or(true),
                source_name: source_name.clone(),
                abi: contract.abi.unwrap_or_else(|| Value::Array(Vec::new())),
                ast: ast.clone(),
                bytecode,
                deployed_bytecode,
                source_map,
                deployed_source_map,
                compiler: compiler.clone(),
                networks: Default::default(),
            });
        }
    }
    Ok(artifacts)
}

fn file_name(source_name: &str) -> String {
    source_name.rsplit('/').next().unwrap_or(source_name).to_string()
}

/// Returns the `0x` prefixed object with link placeholders and the source map
fn linked(bytecode: Option<Bytecode>) -> (String, String) {
    let bytecode = bytecode.unwrap_or_default();
    (
        link_placeholders(&bytecode.object, &bytecode.link_references),
        bytecode.source_map.unwrap_or_default(),
    )
}

/// Replaces every library reference in the hex encoded `object` with a `__<Library>` token padded
/// with `_` to the width of the reference and returns the `0x` prefixed result.
///
/// The offsets in `link_references` are in bytes, so every slice spans twice as many hex
/// characters.
pub fn link_placeholders(object: &str, link_references: &LinkReferences) -> String {
    let mut code = object.trim_start_matches("0x").to_string();
    for libraries in link_references.values() {
        for (library, offsets) in libraries {
            for offset in offsets {
                let start = 2 * offset.start as usize;
                let width = 2 * offset.length as usize;
                if start + width > code.len() || !code.is_char_boundary(start) {
                    tracing::warn!(
                        "link reference of {} at {} is out of bounds, skipping",
                        library,
                        offset.start
                    );
                    continue
                }
                let placeholder = format!("{:_<width$.width$}", format!("__{library}"));
                code.replace_range(start..start + width, &placeholder);
            }
        }
    }
    format!("0x{code}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifacts::{CompilerOutput, Offsets},
        project_util::MockCompiler,
    };
    use pretty_assertions::assert_eq;
    use std::{collections::BTreeMap, path::PathBuf};

    fn file(name: &str, content: &str, package: Option<&str>) -> SourceFile {
        SourceFile {
            logical_name: name.to_string(),
            path: PathBuf::from("/project").join(name),
            package: package.map(str::to_string),
            source: crate::artifacts::Source::new(content),
            last_modified: None,
            data: Default::default(),
        }
    }

    #[test]
    fn replaces_link_references() {
        let object = format!("6080{}6040{}00", "ab".repeat(20), "cd".repeat(20));
        let refs: LinkReferences = BTreeMap::from([(
            "contracts/Math.sol".to_string(),
            BTreeMap::from([(
                "SafeMath".to_string(),
                vec![Offsets { start: 2, length: 20 }, Offsets { start: 24, length: 20 }],
            )]),
        )]);
        let placeholder = format!("{:_<40}", "__SafeMath");
        assert_eq!(
            link_placeholders(&object, &refs),
            format!("0x6080{placeholder}6040{placeholder}00")
        );
    }

    #[test]
    fn truncates_long_library_names() {
        let refs: LinkReferences = BTreeMap::from([(
            "A.sol".to_string(),
            BTreeMap::from([("VeryLongLibraryName".to_string(), vec![Offsets { start: 0, length: 4 }])]),
        )]);
        assert_eq!(link_placeholders("0x11223344ff", &refs), "0x__VeryLoff");
    }

    #[test]
    fn empty_object_is_prefixed() {
        assert_eq!(link_placeholders("", &Default::default()), "0x");
    }

    #[test]
    fn emits_artifact_per_contract() {
        let files = vec![
            file("contracts/Token.sol", "pragma solidity ^0.5.0;\ncontract Token {}\nlibrary Math {}", None),
            file("dep/contracts/Base.sol", "contract Base {}", Some("dep")),
        ];
        let settings = Settings::default();
        let artifacts =
            compile(&files, &settings, &MockCompiler::default(), "0.5.9+commit.e560f70d").unwrap();
        let names: Vec<_> = artifacts.iter().map(|a| a.contract_name.as_str()).collect();
        assert_eq!(names, vec!["Math", "Token", "Base"]);

        let token = &artifacts[1];
        assert_eq!(token.file_name, "Token.sol");
        assert_eq!(token.source_name, "contracts/Token.sol");
        assert!(token.is_local);
        assert!(token.bytecode.starts_with("0x"));
        assert_eq!(token.compiler.version, "0.5.9+commit.e560f70d");
        assert!(!artifacts[2].is_local);
    }

    #[test]
    fn fatal_diagnostics_fail_compilation() {
        let files = vec![
            file("contracts/A.sol", "contract A {}\n// mock:error", None),
            file("contracts/B.sol", "contract B {}\n// mock:error", None),
        ];
        let err = compile(&files, &Settings::default(), &MockCompiler::default(), "0.5.9")
            .unwrap_err();
        match err {
            SolcError::Compile(msg) => {
                assert!(msg.contains("contracts/A.sol"), "{msg}");
                assert!(msg.contains("contracts/B.sol"), "{msg}");
                assert_eq!(msg.lines().count(), 2);
            }
            err => panic!("unexpected error {err:?}"),
        }
    }

    #[test]
    fn warnings_and_info_severity() {
        #[derive(Debug)]
        struct Fixed(&'static str);
        impl CompilerHandle for Fixed {
            fn version(&self) -> Result<String> {
                Ok("0.5.9".to_string())
            }
            fn compile_output(&self, _: &CompilerInput) -> Result<Vec<u8>> {
                Ok(self.0.as_bytes().to_vec())
            }
        }

        let warning = r#"{"errors":[{"severity":"warning","message":"unused variable","type":"Warning","component":"general"}]}"#;
        assert!(compile(&[], &Settings::default(), &Fixed(warning), "0.5.9").unwrap().is_empty());

        let info = r#"{"errors":[{"severity":"info","message":"note","type":"Info","component":"general"}]}"#;
        assert!(matches!(
            compile(&[], &Settings::default(), &Fixed(info), "0.5.9"),
            Err(SolcError::Compile(_))
        ));
        let _: CompilerOutput = serde_json::from_str(info).unwrap();
    }
}
