//! A compiler stand-in for tests

use crate::{
    artifacts::{
        Bytecode, CompilerInput, CompilerOutput, Contract, Error, Evm, Severity, SourceFile,
        SourceLocation,
    },
    compile::CompilerHandle,
    error::Result,
    remappings::Remapping,
    resolver::{self, SolData},
    utils,
};
use path_slash::PathExt;
use serde_json::json;
use sha2::Digest;
use std::path::Path;

/// Marks a source the [MockCompiler] rejects
pub const MOCK_ERROR: &str = "// mock:error";

/// Marks a source the [MockCompiler] warns about
pub const MOCK_WARNING: &str = "// mock:warning";

/// Answers standard-json input without invoking solc.
///
/// Every `contract`, `library` and `interface` declaration becomes a contract in the output. The
/// bytecode is derived from the source name, the contract name and the optimizer settings, so it
/// changes whenever one of them does. Sources containing [MOCK_ERROR] produce an error
/// diagnostic, sources containing [MOCK_WARNING] a warning.
///
/// Imports are looked up like solc does, see [source_unit_name], an import that is not part of
/// the input is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCompiler {
    /// the long version reported by [CompilerHandle::version]
    pub version: String,
}

impl MockCompiler {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into() }
    }

    /// Produces the output solc would produce for the input
    pub fn output(&self, input: &CompilerInput) -> CompilerOutput {
        let mut output = CompilerOutput::default();
        for (id, (name, source)) in input.sources.iter().enumerate() {
            output.sources.insert(
                name.clone(),
                SourceFile {
                    id: id as u32,
                    ast: Some(json!({ "absolutePath": name, "nodeType": "SourceUnit" })),
                },
            );

            let data = SolData::parse(&source.content, Path::new(name));
            let missing = data
                .imports
                .iter()
                .map(|import| source_unit_name(name, import, &input.settings.remappings))
                .find(|unit| !input.sources.contains_key(unit));
            if let Some(unit) = missing {
                let message = format!("Source \"{unit}\" not found: File not found.");
                output.errors.push(diagnostic(name, Severity::Error, "ParserError", &message));
                continue
            }

            if source.content.contains(MOCK_ERROR) {
                output.errors.push(diagnostic(name, Severity::Error, "ParserError", "mock error"));
                continue
            }
            if source.content.contains(MOCK_WARNING) {
                output.errors.push(diagnostic(name, Severity::Warning, "Warning", "mock warning"));
            }

            let contracts = output.contracts.entry(name.clone()).or_default();
            for contract in utils::find_contract_names(&source.content) {
                let optimizer = &input.settings.optimizer;
                let bytecode = |kind: &str| {
                    let mut hasher = sha2::Sha256::new();
                    hasher.update(format!(
                        "{kind}:{name}:{contract}:{}:{}",
                        optimizer.enabled, optimizer.runs
                    ));
                    Bytecode {
                        object: hex::encode(hasher.finalize()),
                        source_map: Some("0:0:0:-".to_string()),
                        link_references: Default::default(),
                    }
                };
                contracts.insert(
                    contract.to_string(),
                    Contract {
                        abi: Some(json!([])),
                        evm: Some(Evm {
                            bytecode: Some(bytecode("creation")),
                            deployed_bytecode: Some(bytecode("runtime")),
                        }),
                    },
                );
            }
        }
        output
    }
}

impl Default for MockCompiler {
    fn default() -> Self {
        Self::new("0.5.9+commit.e560f70d")
    }
}

impl CompilerHandle for MockCompiler {
    fn version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    fn compile_output(&self, input: &CompilerInput) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.output(input))?)
    }
}

/// The source unit name solc looks up for `import` of the source `importer`.
///
/// Relative imports are joined with the importer's name, everything else is used as written.
/// The remapping with the longest matching context wins, then the one with the longest prefix.
pub fn source_unit_name(importer: &str, import: &Path, remappings: &[Remapping]) -> String {
    let unit = if resolver::is_relative_import(import) {
        resolver::join_unit_name(importer, import)
    } else {
        import.to_slash_lossy().into_owned()
    };
    let remapping = remappings
        .iter()
        .filter(|r| r.context.as_deref().map_or(true, |c| importer.starts_with(c)))
        .filter(|r| unit.starts_with(&r.name))
        .max_by_key(|r| (r.context.as_deref().map_or(0, str::len), r.name.len()));
    match remapping {
        Some(r) => format!("{}{}", r.path, &unit[r.name.len()..]),
        None => unit,
    }
}

fn diagnostic(file: &str, severity: Severity, kind: &str, message: &str) -> Error {
    Error {
        source_location: Some(SourceLocation { file: file.to_string(), start: 0, end: 0 }),
        r#type: kind.to_string(),
        component: "general".to_string(),
        severity,
        error_code: None,
        message: message.to_string(),
        formatted_message: Some(format!("{kind}: {message} in {file}\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Settings, Source, Sources};

    #[test]
    fn emits_declared_contracts() {
        let sources = Sources::from([
            ("contracts/A.sol".to_string(), Source::new("contract A {}\ninterface IA {}")),
            ("contracts/B.sol".to_string(), Source::new("contract B {}\n// mock:error")),
        ]);
        let output = MockCompiler::default().compile(&CompilerInput::new(sources, Settings::default())).unwrap();
        assert_eq!(output.contracts["contracts/A.sol"].len(), 2);
        assert!(!output.contracts.contains_key("contracts/B.sol"));
        assert!(output.has_error());
        assert_eq!(output.sources.len(), 2);
    }

    #[test]
    fn reports_imports_missing_from_input() {
        let sources = Sources::from([
            ("oz/token/T.sol".to_string(), Source::new("import \"token/Base.sol\";\ncontract T {}")),
            ("oz/token/Base.sol".to_string(), Source::new("contract Base {}")),
        ]);
        let mut input = CompilerInput::new(sources, Settings::default());
        let output = MockCompiler::default().compile(&input).unwrap();
        assert!(output.has_error());
        assert!(output.errors[0].message.contains("\"token/Base.sol\" not found"));

        input.settings.remappings =
            vec![Remapping::with_context("oz/token/T.sol", "token/", "oz/token/")];
        let output = MockCompiler::default().compile(&input).unwrap();
        assert!(!output.has_error());
        assert_eq!(output.contracts.len(), 2);
    }

    #[test]
    fn can_derive_source_unit_names() {
        let remappings = [
            "oz/:contracts/=oz/contracts/".parse::<Remapping>().unwrap(),
            "oz/a/A.sol:contracts/=oz/other/".parse().unwrap(),
            ":lib/=node_modules/lib/".parse().unwrap(),
        ];
        let name = |importer: &str, import: &str| {
            source_unit_name(importer, Path::new(import), &remappings)
        };
        assert_eq!(name("contracts/A.sol", "./B.sol"), "contracts/B.sol");
        assert_eq!(name("contracts/A.sol", "contracts/B.sol"), "contracts/B.sol");
        assert_eq!(name("oz/b/B.sol", "contracts/C.sol"), "oz/contracts/C.sol");
        assert_eq!(name("oz/a/A.sol", "contracts/C.sol"), "oz/other/C.sol");
        assert_eq!(name("contracts/A.sol", "lib/L.sol"), "node_modules/lib/L.sol");
    }
}
