#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod artifacts;
pub use artifacts::{CompilerInput, CompilerOutput, EvmVersion, Optimizer, Settings};

pub mod artifact_output;
pub use artifact_output::{CompiledArtifact, CompilerInfo, DeploymentRecords, DuplicateContract};

mod compile;
pub use compile::{
    link_placeholders, provider::verify_checksum, BuildContext, BuildState, CompilerHandle,
    CompilerProvider, ProjectCompileOutput, ProjectCompiler, ScriptedSolc, Solc,
};

mod config;
pub use config::{
    CompilerConfig, CompilerConfigBuilder, ProjectPathsConfig, ProjectPathsConfigBuilder,
    SolcConfig, SolcConfigBuilder,
};

pub mod remappings;
pub use remappings::Remapping;

pub mod releases;
pub use releases::{CompilerRelease, Platform, ReleaseManifest, VersionConstraint};

pub mod resolver;
pub use resolver::{Graph, SourceFile};

pub mod report;

/// Utilities for creating, mocking and testing of (temporary) projects
#[cfg(any(test, feature = "project-util"))]
pub mod project_util;

pub mod error;
pub mod utils;

use crate::artifact_output::ArtifactsDir;
use error::Result;
use std::{fmt, sync::Arc};

/// Handles contract compiling
#[derive(Debug, Clone)]
pub struct Project {
    /// The layout of the project
    pub paths: ProjectPathsConfig,
    /// How solc invocation should be configured.
    pub solc_config: SolcConfig,
    /// Where compilers are found, fetched from and cached
    pub compiler_config: CompilerConfig,
    /// Whether to compile even if the artifacts are up to date
    pub force: bool,
    /// Compiler that is used instead of resolving a release from the version pragmas
    pub compiler: Option<Arc<dyn CompilerHandle>>,
}

impl Project {
    /// Configure the current project
    ///
    /// # Example
    ///
    /// ```rust
    /// use solc_pipeline::Project;
    /// let project = Project::builder().build().unwrap();
    /// ```
    pub fn builder() -> ProjectBuilder {
        ProjectBuilder::default()
    }

    /// Returns all sources of the project and everything they import
    pub fn sources(&self) -> Result<Vec<SourceFile>> {
        Ok(Graph::resolve_dir(&self.paths.sources, &self.paths.root)?.into_files())
    }

    /// The context of a new build, a snapshot of the current configuration
    pub fn context(&self) -> BuildContext {
        BuildContext {
            paths: self.paths.clone(),
            settings: self.solc_config.settings.clone(),
            version: self.solc_config.version.clone(),
            compiler: self.compiler_config.clone(),
            force: self.force,
            pinned: self.compiler.clone(),
        }
    }

    /// Compiles all sources of the project and writes an artifact for every contract.
    ///
    /// Nothing is compiled if the existing artifacts are up to date.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use solc_pipeline::Project;
    /// let project = Project::builder().build().unwrap();
    /// let output = project.compile().unwrap();
    /// ```
    #[tracing::instrument(skip_all, name = "project::compile")]
    pub fn compile(&self) -> Result<ProjectCompileOutput> {
        let ctx = self.context();
        ProjectCompiler::new(&ctx).compile()
    }

    /// Removes all artifact files
    pub fn cleanup(&self) -> Result<()> {
        let artifacts = ArtifactsDir::new(&self.paths.artifacts);
        let removed = artifacts.remove_all()?;
        tracing::debug!("removed {} artifacts in \"{}\"", removed, artifacts.root.display());
        Ok(())
    }
}

#[derive(Default)]
pub struct ProjectBuilder {
    /// The layout of the project
    paths: Option<ProjectPathsConfig>,
    /// How solc invocation should be configured.
    solc_config: Option<SolcConfig>,
    /// Where compilers are found
    compiler_config: Option<CompilerConfig>,
    /// Whether to ignore up to date artifacts, default is false.
    force: bool,
    /// Compiler to use for every build
    compiler: Option<Arc<dyn CompilerHandle>>,
}

impl ProjectBuilder {
    pub fn paths(mut self, paths: ProjectPathsConfig) -> Self {
        self.paths = Some(paths);
        self
    }

    pub fn solc_config(mut self, solc_config: SolcConfig) -> Self {
        self.solc_config = Some(solc_config);
        self
    }

    pub fn compiler_config(mut self, compiler_config: CompilerConfig) -> Self {
        self.compiler_config = Some(compiler_config);
        self
    }

    /// Always compile, even if the artifacts are up to date
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Sets whether to compile even if the artifacts are up to date
    pub fn set_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Uses this compiler instead of resolving, downloading and caching a release
    pub fn compiler(mut self, compiler: impl CompilerHandle + 'static) -> Self {
        self.compiler = Some(Arc::new(compiler));
        self
    }

    pub fn build(self) -> Result<Project> {
        let Self { paths, solc_config, compiler_config, force, compiler } = self;
        Ok(Project {
            paths: paths.map(Ok).unwrap_or_else(ProjectPathsConfig::current)?,
            solc_config: solc_config.unwrap_or_default(),
            compiler_config: compiler_config.unwrap_or_default(),
            force,
            compiler,
        })
    }
}

impl fmt::Debug for ProjectBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectBuilder")
            .field("paths", &self.paths)
            .field("solc_config", &self.solc_config)
            .field("force", &self.force)
            .finish_non_exhaustive()
    }
}
