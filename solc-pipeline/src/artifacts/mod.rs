//! Solc artifact types
//!
//! The standard-json request and response types, see also
//! <https://docs.soliditylang.org/en/latest/using-the-compiler.html#compiler-input-and-output-json-description>

use crate::{
    compile::{
        BERLIN_SOLC, BYZANTIUM_SOLC, CONSTANTINOPLE_SOLC, ISTANBUL_SOLC, LONDON_SOLC, PARIS_SOLC,
        PETERSBURG_SOLC, SHANGHAI_SOLC,
    },
    remappings::Remapping,
};
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, str::FromStr};
use yansi::Paint;

pub(crate) mod serde_helpers;

/// The language identifier passed to solc
pub const SOLIDITY: &str = "Solidity";

/// Solidity sources keyed by their logical name
pub type Sources = BTreeMap<String, Source>;

/// `file -> (contract name -> Contract)`
pub type Contracts = BTreeMap<String, BTreeMap<String, Contract>>;

/// `file -> (library name -> offsets)`
pub type LinkReferences = BTreeMap<String, BTreeMap<String, Vec<Offsets>>>;

/// Input type `solc` expects
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerInput {
    pub language: String,
    pub sources: Sources,
    pub settings: Settings,
}

impl CompilerInput {
    /// Creates a new Solidity input for the given sources and settings
    pub fn new(sources: Sources, settings: Settings) -> Self {
        Self { language: SOLIDITY.to_string(), sources, settings }
    }
}

/// The compile settings that are sent to solc
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Remappings that let solc find imports written differently from the source name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remappings: Vec<Remapping>,
    #[serde(default)]
    pub optimizer: Optimizer,
    #[serde(default)]
    pub output_selection: OutputSelection,
    #[serde(
        default,
        with = "serde_helpers::display_from_str_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub evm_version: Option<EvmVersion>,
}

impl Settings {
    /// Returns the settings with the evm version capped to what the given solc `version`
    /// supports
    #[must_use]
    pub fn normalized(mut self, version: &Version) -> Self {
        self.evm_version = self.evm_version.and_then(|evm| evm.normalize_version(version));
        self
    }

    #[must_use]
    pub fn with_remappings(mut self, remappings: impl IntoIterator<Item = Remapping>) -> Self {
        self.remappings = remappings.into_iter().collect();
        self
    }

    /// Whether both settings produce the same bytecode.
    ///
    /// The output selection is fixed and remappings follow from the sources, both are ignored.
    pub fn matches(&self, other: &Settings) -> bool {
        self.optimizer == other.optimizer && self.evm_version == other.evm_version
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remappings: Vec::new(),
            optimizer: Default::default(),
            output_selection: OutputSelection::default_output_selection(),
            evm_version: None,
        }
    }
}

/// Optimizer settings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optimizer {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_runs")]
    pub runs: u32,
}

fn default_runs() -> u32 {
    200
}

impl Optimizer {
    pub fn new(enabled: bool, runs: u32) -> Self {
        Self { enabled, runs }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self { enabled: false, runs: default_runs() }
    }
}

/// `file -> (contract -> outputs)`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputSelection(pub BTreeMap<String, BTreeMap<String, Vec<String>>>);

impl OutputSelection {
    /// The outputs requested for every contract in every file
    pub const CONTRACT_OUTPUTS: [&'static str; 7] = [
        "abi",
        "evm.bytecode.object",
        "evm.bytecode.sourceMap",
        "evm.bytecode.linkReferences",
        "evm.deployedBytecode.object",
        "evm.deployedBytecode.sourceMap",
        "evm.deployedBytecode.linkReferences",
    ];

    /// ABI, AST and creation + runtime bytecode with source maps for everything
    pub fn default_output_selection() -> Self {
        let contract = Self::CONTRACT_OUTPUTS.iter().map(|s| s.to_string()).collect();
        let file = BTreeMap::from([
            ("*".to_string(), contract),
            (String::new(), vec!["ast".to_string()]),
        ]);
        Self(BTreeMap::from([("*".to_string(), file)]))
    }
}

impl Default for OutputSelection {
    fn default() -> Self {
        Self::default_output_selection()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvmVersion {
    Homestead,
    TangerineWhistle,
    SpuriousDragon,
    Byzantium,
    Constantinople,
    Petersburg,
    Istanbul,
    Berlin,
    London,
    Paris,
    Shanghai,
}

impl EvmVersion {
    /// Checks against the given solidity `semver::Version`
    ///
    /// Returns `None` if the compiler does not accept an evm version at all.
    pub fn normalize_version(self, version: &Version) -> Option<EvmVersion> {
        // the EVM version flag was only added at 0.4.21
        // we work our way backwards
        if version >= &BYZANTIUM_SOLC {
            // If the Solc is at least at shanghai, it supports all EVM versions
            Some(if version >= &SHANGHAI_SOLC {
                self
                // For all other cases, cap at the at-the-time highest possible
                // fork
            } else if version >= &PARIS_SOLC && self >= EvmVersion::Paris {
                EvmVersion::Paris
            } else if version >= &LONDON_SOLC && self >= EvmVersion::London {
                EvmVersion::London
            } else if version >= &BERLIN_SOLC && self >= EvmVersion::Berlin {
                EvmVersion::Berlin
            } else if version >= &ISTANBUL_SOLC && self >= EvmVersion::Istanbul {
                EvmVersion::Istanbul
            } else if version >= &PETERSBURG_SOLC && self >= EvmVersion::Petersburg {
                EvmVersion::Petersburg
            } else if version >= &CONSTANTINOPLE_SOLC && self >= EvmVersion::Constantinople {
                EvmVersion::Constantinople
            } else if self >= EvmVersion::Byzantium {
                EvmVersion::Byzantium
            } else {
                self
            })
        } else {
            None
        }
    }
}

impl fmt::Display for EvmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = match self {
            EvmVersion::Homestead => "homestead",
            EvmVersion::TangerineWhistle => "tangerineWhistle",
            EvmVersion::SpuriousDragon => "spuriousDragon",
            EvmVersion::Byzantium => "byzantium",
            EvmVersion::Constantinople => "constantinople",
            EvmVersion::Petersburg => "petersburg",
            EvmVersion::Istanbul => "istanbul",
            EvmVersion::Berlin => "berlin",
            EvmVersion::London => "london",
            EvmVersion::Paris => "paris",
            EvmVersion::Shanghai => "shanghai",
        };
        write!(f, "{string}")
    }
}

impl FromStr for EvmVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "homestead" => Ok(EvmVersion::Homestead),
            "tangerineWhistle" => Ok(EvmVersion::TangerineWhistle),
            "spuriousDragon" => Ok(EvmVersion::SpuriousDragon),
            "byzantium" => Ok(EvmVersion::Byzantium),
            "constantinople" => Ok(EvmVersion::Constantinople),
            "petersburg" => Ok(EvmVersion::Petersburg),
            "istanbul" => Ok(EvmVersion::Istanbul),
            "berlin" => Ok(EvmVersion::Berlin),
            "london" => Ok(EvmVersion::London),
            "paris" => Ok(EvmVersion::Paris),
            "shanghai" => Ok(EvmVersion::Shanghai),
            s => Err(format!("Unknown evm version: {s}")),
        }
    }
}

impl Serialize for EvmVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EvmVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?.parse().map_err(serde::de::Error::custom)
    }
}

/// Content of a solidity file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub content: String,
}

impl Source {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }
}

impl AsRef<str> for Source {
    fn as_ref(&self) -> &str {
        &self.content
    }
}

/// Output type `solc` produces
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOutput {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Error>,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceFile>,
    #[serde(default)]
    pub contracts: Contracts,
}

impl CompilerOutput {
    /// Whether the output contains a diagnostic that is not a warning
    pub fn has_error(&self) -> bool {
        self.errors.iter().any(|err| !err.severity.is_warning())
    }

    /// All diagnostics that are not warnings
    pub fn fatal_errors(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter().filter(|err| !err.severity.is_warning())
    }

    /// All warnings
    pub fn warnings(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter().filter(|err| err.severity.is_warning())
    }
}

/// Per contract output
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// The Ethereum Contract ABI. If empty, it is represented as an empty
    /// array. See <https://docs.soliditylang.org/en/develop/abi-spec.html>
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<serde_json::Value>,
    /// EVM-related outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm: Option<Evm>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<Bytecode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_bytecode: Option<Bytecode>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bytecode {
    /// The bytecode as a hex string, possibly containing link placeholders
    #[serde(default)]
    pub object: String,
    /// The source mapping as a string. See the source mapping definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map: Option<String>,
    /// If given, this is an unlinked object.
    #[serde(default, deserialize_with = "serde_helpers::default_for_null")]
    pub link_references: LinkReferences,
}

/// Byte offsets into the bytecode.
/// Linking replaces the 20 bytes located there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offsets {
    pub start: u32,
    pub length: u32,
}

/// A diagnostic reported by solc
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub component: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_message: Option<String>,
}

impl Error {
    /// The human readable message, preferring the formatted one
    pub fn display_message(&self) -> &str {
        self.formatted_message.as_deref().unwrap_or(&self.message).trim_end()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.formatted_message.is_some() {
            f.write_str(self.display_message())
        } else {
            write!(f, "{}: {}", self.severity, self.message)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub start: i32,
    pub end: i32,
}

/// Severity of a diagnostic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "{}", Paint::red("Error")),
            Severity::Warning => write!(f, "{}", Paint::yellow("Warning")),
            Severity::Info => f.write_str("Info"),
        }
    }
}

impl Severity {
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Severity::Warning)
    }

    pub fn is_info(&self) -> bool {
        matches!(self, Severity::Info)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            s => Err(format!("Invalid severity: {s}")),
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Severity::Error => serializer.serialize_str("error"),
            Severity::Warning => serializer.serialize_str("warning"),
            Severity::Info => serializer.serialize_str("info"),
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?.parse().map_err(serde::de::Error::custom)
    }
}

/// Per file output
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    #[serde(default)]
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast: Option<serde_json::Value>,
}
