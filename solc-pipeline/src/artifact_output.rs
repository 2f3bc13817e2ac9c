//! Output artifact handling

use crate::{
    artifacts::{serde_helpers, EvmVersion, Optimizer, Settings},
    error::{Result, SolcError},
    report, utils,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::PathBuf,
    time::SystemTime,
};

/// `network id -> deployment record`, owned by the deployment layer and carried across builds
pub type DeploymentRecords = BTreeMap<String, Value>;

/// Name of the compiler recorded in every artifact
pub const COMPILER_NAME: &str = "solc";

/// The compiler and settings that produced an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerInfo {
    pub name: String,
    /// long version, `0.5.9+commit.e560f70d`
    pub version: String,
    #[serde(default)]
    pub optimizer: Optimizer,
    #[serde(
        default,
        with = "serde_helpers::display_from_str_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub evm_version: Option<EvmVersion>,
}

impl CompilerInfo {
    pub fn new(version: impl Into<String>, settings: &Settings) -> Self {
        Self {
            name: COMPILER_NAME.to_string(),
            version: version.into(),
            optimizer: settings.optimizer,
            evm_version: settings.evm_version,
        }
    }

    /// Whether an artifact produced with this info is still valid for the given compiler
    /// version and settings
    pub fn matches(&self, version: &str, settings: &Settings) -> bool {
        self.version == version &&
            self.optimizer == settings.optimizer &&
            self.evm_version == settings.evm_version
    }
}

/// A compiled contract as it is written to `<ContractName>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifact {
    pub contract_name: String,
    /// `Token.sol`
    pub file_name: String,
    /// the name solc knows the file by, `contracts/Token.sol`
    pub source_name: String,
    /// absolute location of the file
    pub source_path: String,
    pub source: String,
    pub abi: Value,
    #[serde(default)]
    pub ast: Value,
    /// `0x` prefixed creation bytecode, unlinked libraries are replaced by `__Name___` tokens
    pub bytecode: String,
    pub deployed_bytecode: String,
    #[serde(default)]
    pub source_map: String,
    #[serde(default)]
    pub deployed_source_map: String,
    pub compiler: CompilerInfo,
    #[serde(default)]
    pub networks: DeploymentRecords,
    /// whether the source belongs to the project rather than a dependency package
    #[serde(skip)]
    pub is_local: bool,
}

/// The parts of an existing artifact needed to decide on recompiling and to keep its deployment
/// records.
///
/// Everything is optional, artifacts written by other tools only need to be valid json objects.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingArtifact {
    #[serde(default)]
    pub contract_name: Option<String>,
    #[serde(default)]
    pub compiler: Option<Value>,
    #[serde(default, deserialize_with = "serde_helpers::default_for_null")]
    pub networks: DeploymentRecords,
}

impl ExistingArtifact {
    /// The recorded compiler info, if it is well formed
    pub fn compiler_info(&self) -> Option<CompilerInfo> {
        self.compiler.clone().and_then(|c| serde_json::from_value(c).ok())
    }
}

/// An existing artifact file
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactFile {
    /// path to the file
    pub file: PathBuf,
    pub artifact: ExistingArtifact,
    pub last_modified: Option<SystemTime>,
}

impl ArtifactFile {
    /// The contract the artifact belongs to, falls back to the file stem
    pub fn contract_name(&self) -> Option<String> {
        self.artifact.contract_name.clone().or_else(|| {
            self.file.file_stem().map(|stem| stem.to_string_lossy().into_owned())
        })
    }
}

/// A contract that was not written because another contract has the same name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateContract {
    pub name: String,
    /// source name of the contract that was written
    pub kept: String,
    /// source name of the contract that was dropped
    pub discarded: String,
}

/// The directory all artifacts are written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactsDir {
    pub root: PathBuf,
}

impl ArtifactsDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/<ContractName>.json`
    pub fn artifact_path(&self, contract_name: &str) -> PathBuf {
        self.root.join(format!("{contract_name}.json"))
    }

    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|err| SolcError::io(err, &self.root))
    }

    /// All json files in the directory, sorted
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new())
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|err| SolcError::io(err, &self.root))? {
            let path = entry.map_err(|err| SolcError::io(err, &self.root))?.path();
            if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or_default() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Reads all existing artifacts.
    ///
    /// Fails on the first artifact that is not a json object.
    pub fn read_all(&self) -> Result<Vec<ArtifactFile>> {
        self.files()?
            .into_iter()
            .map(|file| {
                let content = fs::read(&file).map_err(|err| SolcError::io(err, &file))?;
                let artifact = serde_json::from_slice(&content)
                    .map_err(|err| SolcError::InvalidArtifact { path: file.clone(), err })?;
                let last_modified = utils::last_modified(&file);
                Ok(ArtifactFile { file, artifact, last_modified })
            })
            .collect()
    }

    /// Removes the given artifact files
    pub fn remove(&self, files: &[ArtifactFile]) -> Result<()> {
        for file in files {
            tracing::trace!("removing artifact \"{}\"", file.file.display());
            fs::remove_file(&file.file).map_err(|err| SolcError::io(err, &file.file))?;
        }
        Ok(())
    }

    /// Removes every artifact file and returns how many were removed
    pub fn remove_all(&self) -> Result<usize> {
        let files = self.files()?;
        for file in &files {
            fs::remove_file(file).map_err(|err| SolcError::io(err, file))?;
        }
        Ok(files.len())
    }

    /// Writes all artifacts and returns their paths
    pub fn write_all(&self, artifacts: &[CompiledArtifact]) -> Result<Vec<PathBuf>> {
        self.ensure_exists()?;
        artifacts
            .par_iter()
            .map(|artifact| {
                let file = self.artifact_path(&artifact.contract_name);
                utils::write_json_file(artifact, &file)?;
                Ok(file)
            })
            .collect()
    }
}

/// The most recent modification time of all files, `None` if there are no files or the time of
/// any file is unknown
pub fn newest_modified<'a>(times: impl IntoIterator<Item = &'a Option<SystemTime>>) -> Option<SystemTime> {
    let mut newest = None;
    for time in times {
        let time = (*time)?;
        if newest.map(|newest| time > newest).unwrap_or(true) {
            newest = Some(time);
        }
    }
    newest
}

/// Collects the deployment records of existing artifacts by contract name
pub fn deployment_records(existing: &[ArtifactFile]) -> HashMap<String, DeploymentRecords> {
    existing
        .iter()
        .filter(|file| !file.artifact.networks.is_empty())
        .filter_map(|file| Some((file.contract_name()?, file.artifact.networks.clone())))
        .collect()
}

/// Keeps one artifact per contract name.
///
/// A contract from the project wins over one from a dependency, otherwise the first one is kept.
pub fn dedupe_contracts(
    artifacts: Vec<CompiledArtifact>,
) -> (Vec<CompiledArtifact>, Vec<DuplicateContract>) {
    let mut kept: Vec<CompiledArtifact> = Vec::with_capacity(artifacts.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut duplicates = Vec::new();

    for artifact in artifacts {
        let idx = match index.get(&artifact.contract_name).copied() {
            Some(idx) => idx,
            None => {
                index.insert(artifact.contract_name.clone(), kept.len());
                kept.push(artifact);
                continue
            }
        };
        let discarded = if artifact.is_local && !kept[idx].is_local {
            std::mem::replace(&mut kept[idx], artifact)
        } else {
            artifact
        };
        let duplicate = DuplicateContract {
            name: discarded.contract_name.clone(),
            kept: kept[idx].source_name.clone(),
            discarded: discarded.source_name,
        };
        tracing::warn!(
            "duplicate contract {}: discarding \"{}\" in favor of \"{}\"",
            duplicate.name,
            duplicate.discarded,
            duplicate.kept
        );
        report::duplicate_contract(&duplicate.name, &duplicate.kept, &duplicate.discarded);
        duplicates.push(duplicate);
    }
    (kept, duplicates)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    pub(crate) fn artifact(name: &str, source_name: &str, is_local: bool) -> CompiledArtifact {
        CompiledArtifact {
            contract_name: name.to_string(),
            file_name: format!("{name}.sol"),
            source_name: source_name.to_string(),
            source_path: format!("/project/{source_name}"),
            source: format!("contract {name} {{}}"),
            abi: json!([]),
            ast: Value::Null,
            bytecode: "0x".to_string(),
            deployed_bytecode: "0x".to_string(),
            source_map: String::new(),
            deployed_source_map: String::new(),
            compiler: CompilerInfo::new("0.5.9+commit.e560f70d", &Settings::default()),
            networks: Default::default(),
            is_local,
        }
    }

    #[test]
    fn serializes_camel_case() {
        let mut artifact = artifact("Token", "contracts/Token.sol", true);
        artifact.networks.insert("1".to_string(), json!({ "address": "0x01" }));
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["contractName"], "Token");
        assert_eq!(value["deployedBytecode"], "0x");
        assert_eq!(value["compiler"]["name"], "solc");
        assert_eq!(value["compiler"]["optimizer"], json!({ "enabled": false, "runs": 200 }));
        assert_eq!(value["networks"]["1"]["address"], "0x01");
        assert!(value.get("isLocal").is_none());
    }

    #[test]
    fn local_contract_wins_over_dependency() {
        let (kept, duplicates) = dedupe_contracts(vec![
            artifact("SafeMath", "openzeppelin-solidity/contracts/math/SafeMath.sol", false),
            artifact("Token", "contracts/Token.sol", true),
            artifact("SafeMath", "contracts/SafeMath.sol", true),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].source_name, "contracts/SafeMath.sol");
        assert_eq!(
            duplicates,
            vec![DuplicateContract {
                name: "SafeMath".to_string(),
                kept: "contracts/SafeMath.sol".to_string(),
                discarded: "openzeppelin-solidity/contracts/math/SafeMath.sol".to_string(),
            }]
        );
    }

    #[test]
    fn first_contract_wins_otherwise() {
        let (kept, duplicates) = dedupe_contracts(vec![
            artifact("A", "contracts/A.sol", true),
            artifact("A", "contracts/other/A.sol", true),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source_name, "contracts/A.sol");
        assert_eq!(duplicates[0].discarded, "contracts/other/A.sol");
    }

    #[test]
    fn reads_existing_artifacts_leniently() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ArtifactsDir::new(tmp.path().join("build"));
        assert!(dir.read_all().unwrap().is_empty());

        dir.ensure_exists().unwrap();
        fs::write(
            dir.artifact_path("Foreign"),
            r#"{"abi": [], "networks": {"3": {"address": "0x02"}}}"#,
        )
        .unwrap();
        fs::write(dir.root.join("notes.txt"), "not an artifact").unwrap();
        let written = dir.write_all(&[artifact("Token", "contracts/Token.sol", true)]).unwrap();
        assert_eq!(written, vec![dir.artifact_path("Token")]);

        let existing = dir.read_all().unwrap();
        assert_eq!(existing.len(), 2);
        let records = deployment_records(&existing);
        assert_eq!(records["Foreign"]["3"]["address"], "0x02");
        assert!(!records.contains_key("Token"));

        let token = existing.iter().find(|f| f.contract_name().as_deref() == Some("Token")).unwrap();
        let info = token.artifact.compiler_info().unwrap();
        assert!(info.matches("0.5.9+commit.e560f70d", &Settings::default()));
        assert!(!info.matches("0.5.10+commit.5a6ea5b1", &Settings::default()));
    }

    #[test]
    fn invalid_artifact_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ArtifactsDir::new(tmp.path());
        fs::write(dir.artifact_path("Broken"), "{ not json").unwrap();
        let err = dir.read_all().unwrap_err();
        assert!(matches!(err, SolcError::InvalidArtifact { .. }), "{err}");
    }

    #[test]
    fn newest_requires_all_times() {
        let old = SystemTime::UNIX_EPOCH;
        let new = SystemTime::now();
        assert_eq!(newest_modified(&[Some(old), Some(new)]), Some(new));
        assert_eq!(newest_modified(&[Some(old), None]), None);
        assert_eq!(newest_modified(&Vec::new()), None);
    }
}
