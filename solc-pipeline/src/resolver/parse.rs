use crate::utils;
use solang_parser::pt::{Import, SourceUnitPart};
use std::path::{Path, PathBuf};

/// Represents various information about a solidity file parsed via [solang_parser]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolData {
    /// The raw version pragma, `^0.5.0` for `pragma solidity ^0.5.0;`
    pub version: Option<String>,
    /// All raw import paths in declaration order
    pub imports: Vec<PathBuf>,
}

impl SolData {
    /// Extracts the useful data from a solidity source
    ///
    /// Imports are read from the solidity AST. If the file can not be parsed it is treated as if
    /// it had no imports at all, solc will report the syntax error once it gets to compile the
    /// file.
    pub fn parse(content: &str, file: &Path) -> Self {
        let version = utils::find_version_pragma(content).map(str::to_string);
        let mut imports = Vec::new();
        match solang_parser::parse(content, 0) {
            Ok((units, _)) => {
                for unit in units.0 {
                    if let SourceUnitPart::ImportDirective(import) = unit {
                        let import = match import {
                            Import::Plain(s, _) => s,
                            Import::GlobalSymbol(s, _, _) => s,
                            Import::Rename(s, _, _) => s,
                        };
                        imports.push(PathBuf::from(import.string));
                    }
                }
            }
            Err(err) => {
                tracing::warn!(
                    "failed to parse imports of \"{}\", assuming it has none: {:?}",
                    file.display(),
                    err
                );
            }
        }
        Self { version, imports }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_parse_imports_and_version() {
        let content = r#"
pragma solidity ^0.5.0;

import "./Ownable.sol";
import { T } from "../Test.sol";
import * as Lib from "openzeppelin-solidity/contracts/math/SafeMath.sol";
import "zos-lib/contracts/Initializable.sol" as Init;

contract A {}
"#;
        let data = SolData::parse(content, Path::new("A.sol"));
        assert_eq!(data.version.as_deref(), Some("^0.5.0"));
        assert_eq!(
            data.imports,
            vec![
                PathBuf::from("./Ownable.sol"),
                "../Test.sol".into(),
                "openzeppelin-solidity/contracts/math/SafeMath.sol".into(),
                "zos-lib/contracts/Initializable.sol".into(),
            ]
        );
    }

    #[test]
    fn unparsable_source_has_no_imports() {
        let content = r#"
pragma solidity >=0.4.24 <0.6.0;
import "./Other.sol";
contract Broken {
    function f( {
"#;
        let data = SolData::parse(content, Path::new("Broken.sol"));
        assert!(data.imports.is_empty());
        assert_eq!(data.version.as_deref(), Some(">=0.4.24 <0.6.0"));
    }

    #[test]
    fn missing_pragma() {
        let data = SolData::parse("contract A {}", Path::new("A.sol"));
        assert_eq!(data, SolData::default());
    }
}
