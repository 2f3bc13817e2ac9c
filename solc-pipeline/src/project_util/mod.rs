//! Utilities for mocking project workspaces
use crate::{
    artifact_output::{ArtifactsDir, CompiledArtifact},
    compile::CompilerHandle,
    config::{CompilerConfig, ProjectPathsConfig},
    error::{Result, SolcError},
    resolver::NODE_MODULES,
    utils, Project, ProjectBuilder, ProjectCompileOutput,
};
use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tempfile::TempDir;

pub mod mock;

pub use mock::MockCompiler;

/// A [`Project`] wrapper that lives in a new temporary directory
///
/// Once `TempProject` is dropped, the temp dir is automatically removed, see [`TempDir::drop()`]
pub struct TempProject {
    /// temporary workspace root
    _root: TempDir,
    /// actual project workspace with the `root` tempdir as its root
    inner: Project,
}

impl TempProject {
    /// Creates a new temp project that compiles with the [MockCompiler]
    pub fn new() -> Result<Self> {
        Self::with_compiler(MockCompiler::default())
    }

    /// Creates a new temp project that always compiles with the given compiler
    pub fn with_compiler(compiler: impl CompilerHandle + 'static) -> Result<Self> {
        Self::prefixed("temp-project", |builder| builder.compiler(compiler))
    }

    /// Creates a new temp project that resolves compiler releases with the given config
    pub fn with_compiler_config(config: CompilerConfig) -> Result<Self> {
        Self::prefixed("temp-project", |builder| builder.compiler_config(config))
    }

    /// Creates a new temp project inside a tempdir with a prefixed directory.
    ///
    /// The project uses the default layout, its compiler cache lives in the tempdir as well and
    /// native solc installations are ignored. `f` can override any of this.
    pub fn prefixed(
        prefix: &str,
        f: impl FnOnce(ProjectBuilder) -> ProjectBuilder,
    ) -> Result<Self> {
        let tmp_dir = tempdir(prefix)?;
        let paths = ProjectPathsConfig::new(tmp_dir.path())?;
        let compiler_config = CompilerConfig::builder()
            .cache_dir(paths.root.join("solc-cache"))
            .native_solc(None::<PathBuf>)
            .retries(0)
            .build();
        let inner =
            f(Project::builder().paths(paths).compiler_config(compiler_config)).build()?;
        Self::create_new(tmp_dir, inner)
    }

    /// Makes sure all resources are created
    pub fn create_new(root: TempDir, inner: Project) -> Result<Self> {
        let project = Self { _root: root, inner };
        for dir in [&project.paths().sources, &project.paths().artifacts] {
            std::fs::create_dir_all(dir).map_err(|err| SolcError::io(err, dir))?;
        }
        Ok(project)
    }

    pub fn project(&self) -> &Project {
        &self.inner
    }

    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.inner
    }

    pub fn compile(&self) -> Result<ProjectCompileOutput> {
        self.project().compile()
    }

    /// Compiles the project even if the artifacts are up to date
    pub fn compile_forced(&mut self) -> Result<ProjectCompileOutput> {
        let force = std::mem::replace(&mut self.inner.force, true);
        let res = self.inner.compile();
        self.inner.force = force;
        res
    }

    /// The configured paths of the project
    pub fn paths(&self) -> &ProjectPathsConfig {
        &self.project().paths
    }

    /// The root path of the temporary workspace
    pub fn root(&self) -> &Path {
        self.project().paths.root.as_path()
    }

    pub fn artifacts_path(&self) -> &PathBuf {
        &self.paths().artifacts
    }

    pub fn sources_path(&self) -> &PathBuf {
        &self.paths().sources
    }

    /// The artifact file of the contract
    pub fn artifact_path(&self, contract_name: &str) -> PathBuf {
        ArtifactsDir::new(self.artifacts_path()).artifact_path(contract_name)
    }

    /// Reads the artifact of the contract
    pub fn read_artifact(&self, contract_name: &str) -> Result<CompiledArtifact> {
        utils::read_json_file(self.artifact_path(contract_name))
    }

    /// Names of all contracts that have an artifact, sorted
    pub fn artifact_names(&self) -> Result<Vec<String>> {
        Ok(ArtifactsDir::new(self.artifacts_path())
            .read_all()?
            .iter()
            .filter_map(|file| file.contract_name())
            .collect())
    }

    /// Adds a new source file, `name` is relative to the sources directory, `.sol` is appended if
    /// missing
    pub fn add_source(&self, name: impl AsRef<str>, content: impl AsRef<str>) -> Result<PathBuf> {
        create_contract_file(self.sources_path().join(contract_file_name(name.as_ref())), content)
    }

    /// Adds a file to the installed dependency package, `<root>/node_modules/<package>/<name>`
    pub fn add_lib(
        &self,
        package: impl AsRef<str>,
        name: impl AsRef<str>,
        content: impl AsRef<str>,
    ) -> Result<PathBuf> {
        let path = self.root().join(NODE_MODULES).join(package.as_ref());
        create_contract_file(path.join(contract_file_name(name.as_ref())), content)
    }

    /// Adds a file anywhere in the workspace, `name` is relative to the root
    pub fn add_file(&self, name: impl AsRef<str>, content: impl AsRef<str>) -> Result<PathBuf> {
        create_contract_file(self.root().join(name.as_ref()), content)
    }

    /// Moves the modification time of the file into the future, so it is newer than every
    /// artifact
    pub fn bump_modified(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let later = SystemTime::now() + Duration::from_secs(10);
        File::options()
            .write(true)
            .open(path)
            .and_then(|file| file.set_modified(later))
            .map_err(|err| SolcError::io(err, path))
    }
}

impl fmt::Debug for TempProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempProject").field("paths", self.paths()).finish()
    }
}

fn create_contract_file(path: PathBuf, content: impl AsRef<str>) -> Result<PathBuf> {
    utils::create_parent_dir_all(&path)?;
    std::fs::write(&path, content.as_ref()).map_err(|err| SolcError::io(err, &path))?;
    Ok(path)
}

fn contract_file_name(name: &str) -> String {
    let name = name.trim();
    if name.ends_with(".sol") {
        name.to_string()
    } else {
        format!("{name}.sol")
    }
}

/// Creates a new temporary directory with the given prefix
fn tempdir(prefix: &str) -> Result<TempDir> {
    tempfile::Builder::new().prefix(prefix).tempdir().map_err(|err| SolcError::io(err, prefix))
}
