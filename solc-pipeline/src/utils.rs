//! Utility functions

use crate::error::{Result, SolcError};
use once_cell::sync::Lazy;
use path_slash::PathExt;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};
use walkdir::WalkDir;

/// A regex that matches the version part of a solidity pragma
/// as follows: `pragma solidity ^0.5.2;` => `^0.5.2`
///
// Adapted from https://github.com/nomiclabs/hardhat/blob/cced766c65b25d3d0beb39ef847246ac9618bdd9/packages/hardhat-core/src/internal/solidity/parse.ts#L119
pub static RE_SOL_PRAGMA_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pragma\s+solidity\s+(?P<version>.+?);").unwrap());

/// Matches top level declarations: `contract Foo`, `library Bar`, `interface Baz`, `abstract
/// contract Qux`
pub static RE_SOL_CONTRACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:abstract\s+)?(?:contract|library|interface)\s+(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)")
        .unwrap()
});

/// Returns the solidity version pragma from the given input:
/// `pragma solidity ^0.5.2;` => `^0.5.2`
pub fn find_version_pragma(contract: &str) -> Option<&str> {
    RE_SOL_PRAGMA_VERSION.captures(contract)?.name("version").map(|m| m.as_str().trim())
}

/// Returns the names of all contracts, libraries and interfaces declared in the source
pub fn find_contract_names(contract: &str) -> impl Iterator<Item = &str> {
    RE_SOL_CONTRACT.captures_iter(contract).filter_map(|cap| cap.name("name")).map(|m| m.as_str())
}

/// Returns a list of absolute paths to all the solidity files under the root, sorted
///
/// NOTE: this does not resolve imports from other locations
///
/// # Example
///
/// ```no_run
/// use solc_pipeline::utils;
/// let sources = utils::source_files("./contracts");
/// ```
pub fn source_files(root: impl AsRef<Path>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map(|ext| ext == "sol").unwrap_or_default())
        .map(|e| e.path().into())
        .collect();
    files.sort();
    files
}

/// Returns the `/` separated path of `path` relative to `root`, or `None` if `path` does not
/// live under `root`
///
/// `/project/contracts/Token.sol` with root `/project` => `contracts/Token.sol`
pub fn source_name(path: &Path, root: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(|p| p.to_slash_lossy().into_owned())
}

/// Canonicalize the path, platform-agnostic
///
/// On windows this will ensure the path only consists of `/` separators
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    dunce::canonicalize(path).map_err(|err| SolcError::io(err, path))
}

/// Returns the last modification time of the file, if the platform reports one
pub fn last_modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Creates the directory and all its parents
pub fn create_parent_dir_all(file: impl AsRef<Path>) -> Result<()> {
    let file = file.as_ref();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(|err| SolcError::io(err, parent))?;
    }
    Ok(())
}

/// Reads the json file and deserialize it into the provided type
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = fs::read(path).map_err(|err| SolcError::io(err, path))?;
    Ok(serde_json::from_slice(&content)?)
}

/// Serializes the value as pretty json and writes it atomically to `path`
pub fn write_json_file<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &content)
}

/// Writes `content` to a temporary file next to `path` and renames it into place afterwards.
///
/// A concurrent reader either sees the previous file or the complete new file.
pub fn write_atomic(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    persist_atomic(path.as_ref(), content, false)
}

/// Same as [write_atomic] but the file is marked executable before it is moved into place
pub fn write_atomic_executable(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    persist_atomic(path.as_ref(), content, true)
}

fn persist_atomic(path: &Path, content: &[u8], executable: bool) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|err| SolcError::io(err, dir))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|err| SolcError::io(err, dir))?;
    tmp.write_all(content).map_err(|err| SolcError::io(err, tmp.path().to_path_buf()))?;
    tmp.as_file().sync_all().map_err(|err| SolcError::io(err, path))?;
    #[cfg(unix)]
    if executable {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o755))
            .map_err(|err| SolcError::io(err, path))?;
    }
    #[cfg(not(unix))]
    let _ = executable;
    tmp.persist(path).map_err(|err| SolcError::io(err.error, path))?;
    Ok(())
}

/// Runs `f` up to `retries + 1` times and returns the first success, or the last error
pub fn retry<T, E: std::fmt::Display>(
    retries: usize,
    what: &str,
    mut f: impl FnMut() -> std::result::Result<T, E>,
) -> std::result::Result<T, E> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(val) => return Ok(val),
            Err(err) if attempt < retries => {
                attempt += 1;
                tracing::warn!("{} failed (attempt {}/{}): {}", what, attempt, retries + 1, err);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashSet,
        fs::{create_dir_all, File},
    };

    #[test]
    fn can_find_solidity_sources() {
        let tmp_dir = tempfile::tempdir().unwrap();

        let file_a = tmp_dir.path().join("a.sol");
        let file_b = tmp_dir.path().join("b.sol");
        let nested = tmp_dir.path().join("nested");
        let file_c = nested.join("c.sol");
        let nested_deep = nested.join("deep");
        let file_d = nested_deep.join("d.sol");
        let not_sol = nested.join("readme.md");
        File::create(&file_a).unwrap();
        File::create(&file_b).unwrap();
        create_dir_all(nested_deep).unwrap();
        File::create(&file_c).unwrap();
        File::create(&file_d).unwrap();
        File::create(not_sol).unwrap();

        let files: HashSet<_> = source_files(tmp_dir.path()).into_iter().collect();
        let expected: HashSet<_> = [file_a, file_b, file_c, file_d].into();
        assert_eq!(files, expected);
    }

    #[test]
    fn can_find_version() {
        let s = r#"//SPDX-License-Identifier: Unlicense
pragma solidity ^0.8.0;
"#;
        assert_eq!(Some("^0.8.0"), find_version_pragma(s));
        assert_eq!(None, find_version_pragma("contract A {}"));
    }

    #[test]
    fn can_find_contract_names() {
        let s = r#"
pragma solidity ^0.5.0;
library SafeMath {}
interface IToken {}
contract Token is IToken {}
    contract Nested {}
"#;
        assert_eq!(
            vec!["SafeMath", "IToken", "Token", "Nested"],
            find_contract_names(s).collect::<Vec<_>>()
        );
    }

    #[test]
    fn can_compute_source_name() {
        let root = Path::new("/project");
        assert_eq!(
            source_name(Path::new("/project/contracts/Token.sol"), root).as_deref(),
            Some("contracts/Token.sol")
        );
        assert_eq!(source_name(Path::new("/elsewhere/Token.sol"), root), None);
    }

    #[test]
    fn atomic_write_replaces_content() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let file = tmp_dir.path().join("nested").join("out.json");
        write_atomic(&file, b"first").unwrap();
        write_atomic(&file, b"second").unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"second");
        // no temp files left behind
        assert_eq!(fs::read_dir(file.parent().unwrap()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_can_mark_executable() {
        use std::os::unix::fs::PermissionsExt;
        let tmp_dir = tempfile::tempdir().unwrap();
        let file = tmp_dir.path().join("solc");
        write_atomic_executable(&file, b"#!/bin/sh").unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn retry_returns_first_success() {
        let mut calls = 0;
        let res: std::result::Result<u32, String> = retry(3, "op", || {
            calls += 1;
            if calls < 3 {
                Err("nope".to_string())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(res, Ok(3));

        let mut calls = 0;
        let res: std::result::Result<(), String> = retry(2, "op", || {
            calls += 1;
            Err(format!("fail {calls}"))
        });
        assert_eq!(res, Err("fail 3".to_string()));
    }
}
