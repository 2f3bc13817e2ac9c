//! Resolution of the entire import graph for a project.
//!
//! This module takes the root files of a project and walks their import statements until every
//! reachable solidity file is known. Imports are resolved in this order:
//!
//!   1. absolute paths are used as they are, if the file exists
//!   2. paths starting with `.` or `..` are resolved relative to the importing file
//!   3. everything else is first looked up relative to the root of the package the importing
//!      file belongs to (the project root for project files)
//!   4. and finally resolved as a dependency package, following the `node_modules` lookup
//!      rules: every ancestor directory of the importing file is checked for
//!      `node_modules/<package>`
//!
//! Files pulled from a dependency keep track of the package root they were found in, so their
//! own root-relative imports resolve against that package rather than the importing project.
//!
//! Every file is visited at most once, keyed by its canonical location on disk, which also
//! collapses diamond and cyclic imports.
//!
//! solc looks up a non-relative import by the path as written. Whenever that is not the name the
//! imported file is stored under, for example a dependency importing `contracts/math/Math.sol`
//! from its own root, the graph records a context remapping for it, see [Graph::remappings].

use crate::{
    artifacts::{Source, Sources},
    error::{Result, SolcError},
    remappings::Remapping,
    utils,
};
use path_slash::PathExt;
use rayon::prelude::*;
use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    path::{Component, Path, PathBuf},
};

mod node;
mod parse;

pub use node::SourceFile;
pub use parse::SolData;

/// Name of the directory dependency packages are installed into
pub const NODE_MODULES: &str = "node_modules";

/// The package a file belongs to, this determines how its root-relative imports and its
/// logical name are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    /// root of the project or of the dependency package
    root: PathBuf,
    /// name of the dependency package, `None` for the project itself
    package: Option<String>,
}

impl Origin {
    fn project(root: PathBuf) -> Self {
        Self { root, package: None }
    }

    /// Returns the name solc uses for the file at `path`
    fn logical_name(&self, path: &Path) -> String {
        match (utils::source_name(path, &self.root), &self.package) {
            (Some(name), Some(package)) => format!("{package}/{name}"),
            (Some(name), None) => name,
            (None, _) => path.to_slash_lossy().into_owned(),
        }
    }
}

/// A fully resolved set of solidity files, starting with the root files followed by all files
/// they import in the order they were discovered.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// all resolved files, unique by logical name
    files: Vec<SourceFile>,
    /// remappings solc needs to find files imported under a name other than their logical name
    remappings: Vec<Remapping>,
    /// the root of the project this graph represents
    root: PathBuf,
}

impl Graph {
    /// Resolves all solidity files found in `input_dir` and everything they import.
    ///
    /// `input_dir` is interpreted relative to `working_dir` if it is not absolute.
    pub fn resolve_dir(input_dir: impl AsRef<Path>, working_dir: impl AsRef<Path>) -> Result<Self> {
        let working_dir = working_dir.as_ref();
        let input_dir = working_dir.join(input_dir);
        if !input_dir.exists() {
            tracing::debug!("sources directory \"{}\" does not exist", input_dir.display());
            return Ok(Graph { root: utils::canonicalize(working_dir)?, ..Default::default() })
        }
        Self::resolve(utils::source_files(&input_dir), working_dir)
    }

    /// Resolves the given root files and all their imports.
    ///
    /// The `root_files` are seeded relative to `working_dir`, which also acts as the root for
    /// root-relative imports of project files.
    #[tracing::instrument(skip_all, name = "graph::resolve")]
    pub fn resolve<I, P>(root_files: I, working_dir: impl AsRef<Path>) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let root = utils::canonicalize(working_dir)?;
        let project = Origin::project(root.clone());

        // read all root files up front, these are usually the bulk of the work
        let roots = root_files
            .into_iter()
            .map(|file| root.join(file))
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|file| {
                let path = utils::canonicalize(&file)?;
                let name = project.logical_name(&path);
                SourceFile::read(path, name, None)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut traversal = Traversal::new(root);
        for file in roots {
            traversal.names.entry(file.path.clone()).or_insert_with(|| file.logical_name.clone());
            traversal.unresolved.push_back(Pending {
                path: file.path.clone(),
                origin: project.clone(),
                name: file.logical_name.clone(),
                file: Some(file),
            });
        }
        while let Some(pending) = traversal.unresolved.pop_front() {
            traversal.visit(pending)?;
        }

        tracing::trace!("resolved {} files", traversal.files.len());
        Ok(Graph {
            files: traversal.files,
            remappings: traversal.remappings.into_iter().collect(),
            root: traversal.root,
        })
    }

    /// All resolved files
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Consumes the graph and returns all resolved files
    pub fn into_files(self) -> Vec<SourceFile> {
        self.files
    }

    /// The remappings that must be passed to solc along with [Self::sources()]
    pub fn remappings(&self) -> &[Remapping] {
        &self.remappings
    }

    /// The root the graph was resolved from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file with the given logical name
    pub fn get(&self, logical_name: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.logical_name == logical_name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns the `Sources` set solc expects, keyed by logical name
    pub fn sources(&self) -> Sources {
        to_sources(&self.files)
    }
}

/// Returns the `Sources` set solc expects, keyed by logical name
pub fn to_sources(files: &[SourceFile]) -> Sources {
    files.iter().map(|f| (f.logical_name.clone(), Source::clone(&f.source))).collect()
}

/// A discovered file waiting to be visited
#[derive(Debug)]
struct Pending {
    /// canonical location
    path: PathBuf,
    origin: Origin,
    /// logical name the file is stored under
    name: String,
    /// the file, if it was already read
    file: Option<SourceFile>,
}

/// The state of a single traversal
#[derive(Debug)]
struct Traversal {
    /// the project root
    root: PathBuf,
    unresolved: VecDeque<Pending>,
    /// locations of all visited files
    visited: HashSet<PathBuf>,
    /// the logical name of every discovered location, the first discovery names the file
    names: HashMap<PathBuf, String>,
    files: Vec<SourceFile>,
    remappings: BTreeSet<Remapping>,
}

impl Traversal {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            unresolved: VecDeque::new(),
            visited: HashSet::new(),
            names: HashMap::new(),
            files: Vec::new(),
            remappings: BTreeSet::new(),
        }
    }

    /// Processes a single dequeued file: skips it if it was seen before, otherwise records it and
    /// queues all of its imports.
    fn visit(&mut self, pending: Pending) -> Result<()> {
        let Pending { path, origin, name, file } = pending;
        if !self.visited.insert(path.clone()) {
            return Ok(())
        }
        let file = match file {
            Some(file) => file,
            None => SourceFile::read(&path, name, origin.package.clone())?,
        };

        for import in file.imports() {
            let (target, target_origin) = resolve_import(import, &file.path, &origin, &self.root)?;
            let computed = if import.is_absolute() {
                import.to_slash_lossy().into_owned()
            } else {
                target_origin.logical_name(&target)
            };
            let target_name = self.names.entry(target.clone()).or_insert(computed).clone();
            self.check_import_name(&file, import, &target_name);
            if !self.visited.contains(&target) {
                self.unresolved.push_back(Pending {
                    path: target,
                    origin: target_origin,
                    name: target_name,
                    file: None,
                });
            }
        }

        if self.files.iter().any(|f| f.logical_name == file.logical_name) {
            tracing::warn!(
                "\"{}\" resolves to the same name as a previously resolved file, ignoring it",
                file.path.display()
            );
            return Ok(())
        }
        self.files.push(file);
        Ok(())
    }

    /// Makes sure solc finds `import` of `importer` under `target_name`.
    ///
    /// solc looks up non-relative imports by the import path as written, a context remapping
    /// redirects it if the file is stored under a different name. Relative imports are joined
    /// with the name of the importer and cannot be redirected.
    fn check_import_name(&mut self, importer: &SourceFile, import: &Path, target_name: &str) {
        if is_relative_import(import) {
            let unit = join_unit_name(&importer.logical_name, import);
            if unit != target_name {
                tracing::warn!(
                    "\"{}\" imports \"{}\" as \"{}\" but it is resolved as \"{}\"",
                    importer.logical_name,
                    import.display(),
                    unit,
                    target_name
                );
            }
            return
        }
        let unit = import.to_slash_lossy();
        if unit != target_name {
            tracing::trace!("remapping \"{}\" of \"{}\" to \"{}\"", unit, importer.logical_name, target_name);
            self.remappings.insert(Remapping::with_context(
                importer.logical_name.clone(),
                unit.into_owned(),
                target_name,
            ));
        }
    }
}

/// The source unit name solc derives for a relative import: `a/b/C.sol` importing `../D.sol` is
/// `a/D.sol`
pub(crate) fn join_unit_name(importer: &str, import: &Path) -> String {
    let mut segments: Vec<&str> = importer.split('/').collect();
    segments.pop();
    let import = import.to_slash_lossy();
    for segment in import.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    segments.join("/")
}

/// Resolves a single import of `importer` to a canonical path on disk and the package it belongs
/// to.
fn resolve_import(
    import: &Path,
    importer: &Path,
    origin: &Origin,
    project_root: &Path,
) -> Result<(PathBuf, Origin)> {
    let cwd = importer.parent().unwrap_or(project_root);
    let not_found = || SolcError::FailedResolveImport {
        import: import.to_path_buf(),
        importer: importer.to_path_buf(),
        root: origin.root.clone(),
    };

    // 1. absolute
    if import.is_absolute() {
        if !import.is_file() {
            return Err(not_found())
        }
        let target = utils::canonicalize(import)?;
        let origin = if target.starts_with(project_root) {
            Origin::project(project_root.to_path_buf())
        } else {
            origin.clone()
        };
        return Ok((target, origin))
    }

    // 2. relative to the importing file
    if is_relative_import(import) {
        let target = cwd.join(import);
        if !target.is_file() {
            return Err(not_found())
        }
        return Ok((utils::canonicalize(target)?, origin.clone()))
    }

    // 3. relative to the root of the package the importer belongs to
    let target = origin.root.join(import);
    if target.is_file() {
        return Ok((utils::canonicalize(target)?, origin.clone()))
    }

    // 4. a dependency package
    if let Some((target, package)) = resolve_package_import(import, cwd)? {
        return Ok((target, package))
    }

    Err(not_found())
}

/// Whether the import starts with `./` or `../`
pub(crate) fn is_relative_import(import: &Path) -> bool {
    matches!(import.components().next(), Some(Component::CurDir | Component::ParentDir))
}

/// Splits `@scope/pkg/contracts/A.sol` into `("@scope/pkg", "contracts/A.sol")` and
/// `pkg/contracts/A.sol` into `("pkg", "contracts/A.sol")`
fn split_package(import: &Path) -> Option<(String, PathBuf)> {
    let mut components = import.components().filter_map(|c| match c {
        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
        _ => None,
    });
    let first = components.next()?;
    let package = if first.starts_with('@') { format!("{first}/{}", components.next()?) } else { first };
    let rest: PathBuf = components.collect();
    if rest.as_os_str().is_empty() {
        return None
    }
    Some((package, rest))
}

/// Looks for `node_modules/<package>/<rest>` in `from` and all of its ancestors
fn resolve_package_import(import: &Path, from: &Path) -> Result<Option<(PathBuf, Origin)>> {
    let Some((package, rest)) = split_package(import) else { return Ok(None) };
    for dir in from.ancestors() {
        let package_root = dir.join(NODE_MODULES).join(&package);
        let target = package_root.join(&rest);
        if target.is_file() {
            tracing::trace!("resolved \"{}\" in \"{}\"", import.display(), package_root.display());
            let origin = Origin { root: utils::canonicalize(&package_root)?, package: Some(package) };
            return Ok(Some((utils::canonicalize(target)?, origin)))
        }
    }
    Ok(None)
}
