use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::path::Path;

use crate::classfile::{CLASS_SUFFIX, ClassInfo};
use crate::classpath::{ClassLoader, LoadedClass, ResourceUrl};
use crate::package::{extract_packages, package_path};
use crate::probe::scan_archive;
use crate::reflect::{contains_any_annotations, is_assignable_from};

/// Decides whether a loaded class belongs in a scan result.
pub trait ClassAccept {
    fn accept(&self, class: &ClassInfo) -> bool;
}

impl<F> ClassAccept for F
where
    F: Fn(&ClassInfo) -> bool,
{
    fn accept(&self, class: &ClassInfo) -> bool {
        self(class)
    }
}

pub struct AnnotatedWithAny<'a> {
    loader: &'a dyn ClassLoader,
    annotations: Vec<String>,
}

impl<'a> AnnotatedWithAny<'a> {
    pub fn new<S: AsRef<str>>(loader: &'a dyn ClassLoader, annotations: &[S]) -> Self {
        Self {
            loader,
            annotations: annotations.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }
}

impl ClassAccept for AnnotatedWithAny<'_> {
    fn accept(&self, class: &ClassInfo) -> bool {
        contains_any_annotations(self.loader, class, &self.annotations)
    }
}

pub struct AssignableTo<'a> {
    loader: &'a dyn ClassLoader,
    supertype: String,
}

impl<'a> AssignableTo<'a> {
    pub fn new(loader: &'a dyn ClassLoader, supertype: &str) -> Self {
        Self {
            loader,
            supertype: supertype.to_string(),
        }
    }
}

impl ClassAccept for AssignableTo<'_> {
    fn accept(&self, class: &ClassInfo) -> bool {
        is_assignable_from(self.loader, &self.supertype, class)
    }
}

/// Scan result: loaded classes keyed by name, so a class reachable through
/// several roots appears once.
#[derive(Debug, Clone, Default)]
pub struct ClassSet {
    classes: BTreeMap<String, LoadedClass>,
}

impl ClassSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: LoadedClass) {
        self.classes.entry(class.name.clone()).or_insert(class);
    }

    pub fn extend(&mut self, other: ClassSet) {
        for class in other {
            self.insert(class);
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&LoadedClass> {
        self.classes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedClass> {
        self.classes.values()
    }
}

impl PartialEq for ClassSet {
    fn eq(&self, other: &Self) -> bool {
        self.classes.len() == other.classes.len()
            && self
                .classes
                .iter()
                .zip(other.classes.iter())
                .all(|((a, ca), (b, cb))| a == b && ca.digest == cb.digest)
    }
}

impl Eq for ClassSet {}

impl IntoIterator for ClassSet {
    type Item = LoadedClass;
    type IntoIter = btree_map::IntoValues<String, LoadedClass>;

    fn into_iter(self) -> Self::IntoIter {
        self.classes.into_values()
    }
}

impl FromIterator<LoadedClass> for ClassSet {
    fn from_iter<I: IntoIterator<Item = LoadedClass>>(iter: I) -> Self {
        let mut set = ClassSet::new();
        for class in iter {
            set.insert(class);
        }
        set
    }
}

/// Classes carrying any of `annotations`, including sub-packages.
/// An empty annotation list accepts every class.
pub fn scan_by_annotations<P, A>(
    loader: &dyn ClassLoader,
    packages: &[P],
    annotations: &[A],
) -> Result<ClassSet>
where
    P: AsRef<str>,
    A: AsRef<str>,
{
    if annotations.is_empty() {
        return scan_generic(loader, true, packages, None);
    }
    let accept = AnnotatedWithAny::new(loader, annotations);
    scan_generic(loader, true, packages, Some(&accept))
}

/// Classes assignable to `supertype`; `None` accepts every class.
pub fn scan_by_supertype<P: AsRef<str>>(
    loader: &dyn ClassLoader,
    supertype: Option<&str>,
    recurse: bool,
    packages: &[P],
) -> Result<ClassSet> {
    match supertype {
        Some(supertype) => {
            let accept = AssignableTo::new(loader, supertype);
            scan_generic(loader, recurse, packages, Some(&accept))
        }
        None => scan_generic(loader, recurse, packages, None),
    }
}

/// Scans every valid package in `packages` and unions the matches.
///
/// Invalid package names are dropped; nothing valid left means an empty
/// result. Any I/O failure aborts the whole scan.
pub fn scan_generic<P: AsRef<str>>(
    loader: &dyn ClassLoader,
    recurse: bool,
    packages: &[P],
    accept: Option<&dyn ClassAccept>,
) -> Result<ClassSet> {
    let packages = extract_packages(packages);
    let mut classes = ClassSet::new();
    if packages.is_empty() {
        log::debug!("no valid package to scan");
        return Ok(classes);
    }

    for package in &packages {
        let found = scan_package(loader, package, accept, recurse)
            .with_context(|| format!("failed to scan classes under package [{package}]"))?;
        classes.extend(found);
    }

    Ok(classes)
}

fn scan_package(
    loader: &dyn ClassLoader,
    package: &str,
    accept: Option<&dyn ClassAccept>,
    recurse: bool,
) -> Result<ClassSet> {
    let mut classes = ClassSet::new();

    for url in loader.resources(&package_path(package))? {
        log::debug!("scanning {url} for package {package}");
        let found = match &url {
            ResourceUrl::Directory(dir) => scan_directory(loader, dir, package, accept, recurse)?,
            ResourceUrl::Archive { .. } => scan_archive(loader, &url, package, accept, recurse)?,
            ResourceUrl::Other(_) => {
                log::debug!("unsupported resource scheme {}: {url}", url.scheme());
                continue;
            }
        };
        classes.extend(found);
    }

    Ok(classes)
}

/// Collects the classes under `dir`, the directory of `base_package` inside a
/// class-output root.
pub fn scan_directory(
    loader: &dyn ClassLoader,
    dir: &Path,
    base_package: &str,
    accept: Option<&dyn ClassAccept>,
    recurse: bool,
) -> Result<ClassSet> {
    if !dir.is_dir() {
        anyhow::bail!("class directory does not exist: {}", dir.display());
    }

    let mut builder = WalkBuilder::new(dir);
    builder
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .sort_by_file_path(|a, b| a.cmp(b));
    if !recurse {
        builder.max_depth(Some(1));
    }

    let mut classes = ClassSet::new();
    for entry in builder.build() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Some(class_name) = class_name_for_file(dir, entry.path(), base_package) else {
            continue;
        };
        collect_class(loader, &class_name, accept, &mut classes);
    }

    Ok(classes)
}

fn class_name_for_file(dir: &Path, file: &Path, base_package: &str) -> Option<String> {
    let relative = file.strip_prefix(dir).ok()?;
    let relative = relative.to_str()?.replace('\\', "/");
    let stem = relative.strip_suffix(CLASS_SUFFIX)?;
    Some(format!("{base_package}.{}", stem.replace('/', ".")))
}

/// Loads `class_name` and keeps it when `accept` (if any) agrees.
/// Classes that fail to load are skipped.
pub(crate) fn collect_class(
    loader: &dyn ClassLoader,
    class_name: &str,
    accept: Option<&dyn ClassAccept>,
    classes: &mut ClassSet,
) {
    let Some(class) = loader.load_class(class_name) else {
        log::trace!("skipping unloadable class {class_name}");
        return;
    };
    if accept.is_none_or(|a| a.accept(&class)) {
        classes.insert(class);
    }
}
