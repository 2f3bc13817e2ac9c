//! Manages compiling of a `Project`
//!
//! A build runs through these states:
//!
//! ```text
//! NotStarted -> SourcesLoaded -> VersionResolved -> SkipRecompile
//!                                                \-> Compiling -> ArtifactsWritten
//! ```
//!
//! Any error moves the build to `Failed`.
//!
//! First all sources of the project and everything they import are resolved, see
//! [`crate::resolver::Graph`]. The version pragmas of all files select a single compiler release.
//!
//! Compiling is skipped if the existing artifacts are at least as new as every source and were
//! produced by the same compiler with the same settings. Otherwise the compiler is obtained, all
//! sources are compiled with a single invocation and the artifacts are replaced. The output
//! directory is only touched once compiling succeeded.

use crate::{
    artifact_output::{self, ArtifactFile, ArtifactsDir, DuplicateContract},
    artifacts::Settings,
    compile::{self, version_short, CompilerHandle, CompilerProvider},
    config::{CompilerConfig, ProjectPathsConfig},
    error::Result,
    releases::{self, CompilerRelease, ReleaseManifest},
    report,
    resolver::{Graph, SourceFile},
};
use std::{fmt, path::PathBuf, sync::Arc};

/// The states of a single build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    NotStarted,
    SourcesLoaded,
    VersionResolved,
    SkipRecompile,
    Compiling,
    Failed,
    ArtifactsWritten,
}

impl BuildState {
    /// Whether the build ended, a skipped build ends without a further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Failed | BuildState::ArtifactsWritten | BuildState::SkipRecompile)
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything a single build needs, fixed when the build starts
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub paths: ProjectPathsConfig,
    /// the requested settings, before they are capped to the compiler version
    pub settings: Settings,
    /// compiler version that replaces the pragmas of the sources
    pub version: Option<String>,
    pub compiler: CompilerConfig,
    /// compile even if the artifacts are up to date
    pub force: bool,
    /// a compiler to use instead of resolving a release
    pub pinned: Option<Arc<dyn CompilerHandle>>,
}

/// The result of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectCompileOutput {
    /// There are no sources
    Empty,
    /// The existing artifacts are up to date
    Unchanged {
        /// long version of the compiler that produced the artifacts
        version: String,
    },
    /// All sources were compiled and the artifacts replaced
    Compiled {
        /// long version of the compiler
        version: String,
        /// all written artifact files
        artifacts: Vec<PathBuf>,
        /// contracts that were dropped because another contract has the same name
        duplicates: Vec<DuplicateContract>,
    },
}

impl ProjectCompileOutput {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ProjectCompileOutput::Unchanged { .. })
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, ProjectCompileOutput::Compiled { .. })
    }

    /// All written artifact files
    pub fn artifacts(&self) -> &[PathBuf] {
        match self {
            ProjectCompileOutput::Compiled { artifacts, .. } => artifacts,
            _ => &[],
        }
    }

    /// All dropped duplicate contracts
    pub fn duplicates(&self) -> &[DuplicateContract] {
        match self {
            ProjectCompileOutput::Compiled { duplicates, .. } => duplicates,
            _ => &[],
        }
    }
}

impl fmt::Display for ProjectCompileOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectCompileOutput::Empty => f.write_str("No sources to compile"),
            ProjectCompileOutput::Unchanged { .. } => f.write_str("Nothing to compile"),
            ProjectCompileOutput::Compiled { version, artifacts, .. } => {
                write!(f, "Compiled {} contracts with solc {}", artifacts.len(), version)
            }
        }
    }
}

/// The compiler a build uses
enum Target {
    Pinned { version: String, handle: Arc<dyn CompilerHandle> },
    Release(CompilerRelease),
}

impl Target {
    /// long version
    fn version(&self) -> &str {
        match self {
            Target::Pinned { version, .. } => version,
            Target::Release(release) => &release.long_version,
        }
    }
}

/// Drives a single build
#[derive(Debug)]
pub struct ProjectCompiler<'a> {
    ctx: &'a BuildContext,
    state: BuildState,
}

impl<'a> ProjectCompiler<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx, state: BuildState::NotStarted }
    }

    /// The current state
    pub fn state(&self) -> BuildState {
        self.state
    }

    fn transition(&mut self, next: BuildState) {
        tracing::debug!("build {} -> {}", self.state, next);
        self.state = next;
    }

    /// Runs the build to completion
    pub fn compile(&mut self) -> Result<ProjectCompileOutput> {
        let res = self.run();
        if let Err(ref err) = res {
            tracing::debug!("build failed: {}", err);
            self.transition(BuildState::Failed);
        }
        res
    }

    fn run(&mut self) -> Result<ProjectCompileOutput> {
        let ctx = self.ctx;
        let graph = Graph::resolve_dir(&ctx.paths.sources, &ctx.paths.root)?;
        let remappings = graph.remappings().to_vec();
        let files = graph.into_files();
        self.transition(BuildState::SourcesLoaded);

        let artifacts = ArtifactsDir::new(&ctx.paths.artifacts);
        if files.is_empty() {
            tracing::debug!("no sources found in \"{}\"", ctx.paths.sources.display());
            artifacts.ensure_exists()?;
            self.transition(BuildState::ArtifactsWritten);
            return Ok(ProjectCompileOutput::Empty)
        }

        let target = self.resolve_target(&files)?;
        let version = target.version().to_string();
        let settings =
            ctx.settings.clone().with_remappings(remappings).normalized(&version_short(&version)?);
        self.transition(BuildState::VersionResolved);

        // read before anything is touched, an unreadable artifact fails the build here
        let existing = artifacts.read_all()?;
        if !ctx.force && is_up_to_date(&files, &existing, &version, &settings) {
            self.transition(BuildState::SkipRecompile);
            report::unchanged(&artifacts.root);
            return Ok(ProjectCompileOutput::Unchanged { version })
        }

        self.transition(BuildState::Compiling);
        let handle = match target {
            Target::Pinned { handle, .. } => handle,
            Target::Release(release) => CompilerProvider::new(ctx.compiler.clone()).obtain(&release)?,
        };
        let compiled = compile::compile(&files, &settings, handle.as_ref(), &version)?;

        let (mut compiled, duplicates) = artifact_output::dedupe_contracts(compiled);
        let mut records = artifact_output::deployment_records(&existing);
        for artifact in compiled.iter_mut() {
            if let Some(networks) = records.remove(&artifact.contract_name) {
                artifact.networks = networks;
            }
        }

        artifacts.remove(&existing)?;
        let written = artifacts.write_all(&compiled)?;
        self.transition(BuildState::ArtifactsWritten);

        Ok(ProjectCompileOutput::Compiled { version, artifacts: written, duplicates })
    }

    fn resolve_target(&self, files: &[SourceFile]) -> Result<Target> {
        if let Some(handle) = self.ctx.pinned.clone() {
            let version = handle.version()?;
            tracing::trace!("using pinned compiler {}", version);
            return Ok(Target::Pinned { version, handle })
        }
        let constraints = releases::version_constraints(files, self.ctx.version.as_deref());
        let manifest = ReleaseManifest::load(&self.ctx.compiler)?;
        let release = manifest.resolve(&constraints, &self.ctx.compiler)?;
        Ok(Target::Release(release))
    }
}

/// Whether the existing artifacts can be kept
fn is_up_to_date(
    files: &[SourceFile],
    existing: &[ArtifactFile],
    version: &str,
    settings: &Settings,
) -> bool {
    let Some(newest_artifact) = artifact_output::newest_modified(existing.iter().map(|a| &a.last_modified))
    else {
        tracing::trace!("no artifacts or unknown artifact modification time");
        return false
    };
    let Some(newest_source) = artifact_output::newest_modified(files.iter().map(|f| &f.last_modified))
    else {
        tracing::trace!("unknown source modification time");
        return false
    };
    if newest_source > newest_artifact {
        tracing::trace!("sources changed since the last build");
        return false
    }
    let matches = existing
        .iter()
        .filter(|a| a.last_modified == Some(newest_artifact))
        .filter_map(|a| a.artifact.compiler_info())
        .any(|info| info.matches(version, settings));
    if !matches {
        tracing::trace!("artifacts were built with a different compiler or settings");
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project_util::{mock::MOCK_ERROR, TempProject};

    #[test]
    fn builds_end_in_a_terminal_state() {
        let project = TempProject::new().unwrap();
        project.add_source("A", "pragma solidity ^0.5.0;\ncontract A {}").unwrap();
        let ctx = project.project().context();

        let mut compiler = ProjectCompiler::new(&ctx);
        assert_eq!(compiler.state(), BuildState::NotStarted);
        assert!(compiler.compile().unwrap().is_compiled());
        assert_eq!(compiler.state(), BuildState::ArtifactsWritten);
        assert!(compiler.state().is_terminal());

        let mut compiler = ProjectCompiler::new(&ctx);
        assert!(compiler.compile().unwrap().is_unchanged());
        assert_eq!(compiler.state(), BuildState::SkipRecompile);
        assert!(compiler.state().is_terminal());

        let file = project.add_source("B", format!("contract B {{}}\n{MOCK_ERROR}")).unwrap();
        project.bump_modified(&file).unwrap();
        let mut compiler = ProjectCompiler::new(&ctx);
        assert!(compiler.compile().is_err());
        assert_eq!(compiler.state(), BuildState::Failed);
        assert!(!BuildState::Compiling.is_terminal());
    }
}
