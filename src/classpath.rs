//! The class-loading side of a scan: which roots hold a package, and how a
//! class name turns into a parsed class file.

use anyhow::{Context, Result};
use memmap2::Mmap;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use zip::ZipArchive;

use crate::classfile::{CLASS_SUFFIX, ClassInfo};
use crate::package::package_path;

pub type LoadedClass = Arc<ClassInfo>;

/// Raw bytes of an archive the loader keeps open.
pub type ArchiveBytes = Arc<dyn AsRef<[u8]> + Send + Sync>;

const FILE_SCHEME: &str = "file";
const JAR_SCHEME: &str = "jar";
const MEM_SCHEME: &str = "mem";
const JAR_SEPARATOR: &str = "!/";

/// Where an archive lives: a file on disk or an in-memory mount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArchiveLocator {
    File(PathBuf),
    Memory(String),
}

impl ArchiveLocator {
    /// `file:<path>` or `mem:<name>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (scheme, rest) = raw.split_once(':')?;
        if rest.is_empty() {
            return None;
        }
        if scheme.eq_ignore_ascii_case(FILE_SCHEME) {
            Some(Self::File(PathBuf::from(rest)))
        } else if scheme.eq_ignore_ascii_case(MEM_SCHEME) {
            Some(Self::Memory(rest.to_string()))
        } else {
            None
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Memory(_) => None,
        }
    }
}

impl fmt::Display for ArchiveLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{FILE_SCHEME}:{}", path.display()),
            Self::Memory(name) => write!(f, "{MEM_SCHEME}:{name}"),
        }
    }
}

/// Location of a package inside one classpath root.
///
/// Displays as `file:<dir>` for directories and `jar:<locator>!/<entry>` for
/// archives. Paths are kept as paths, so non-UTF-8 roots still resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceUrl {
    Directory(PathBuf),
    Archive {
        locator: ArchiveLocator,
        entry: String,
    },
    Other(String),
}

impl ResourceUrl {
    pub fn parse(raw: &str) -> Self {
        let Some((scheme, rest)) = raw.split_once(':') else {
            return Self::Other(raw.to_string());
        };
        if scheme.eq_ignore_ascii_case(FILE_SCHEME) && !rest.is_empty() {
            return Self::Directory(PathBuf::from(rest));
        }
        if scheme.eq_ignore_ascii_case(JAR_SCHEME) {
            let (locator, entry) = rest.split_once(JAR_SEPARATOR).unwrap_or((rest, ""));
            if let Some(locator) = ArchiveLocator::parse(locator) {
                return Self::Archive {
                    locator,
                    entry: entry.to_string(),
                };
            }
        }
        Self::Other(raw.to_string())
    }

    pub fn for_directory(dir: &Path) -> Self {
        Self::Directory(dir.to_path_buf())
    }

    pub fn for_archive_entry(locator: ArchiveLocator, entry: &str) -> Self {
        Self::Archive {
            locator,
            entry: entry.to_string(),
        }
    }

    pub fn scheme(&self) -> &str {
        match self {
            Self::Directory(_) => FILE_SCHEME,
            Self::Archive { .. } => JAR_SCHEME,
            Self::Other(raw) => raw.split_once(':').map_or("", |(scheme, _)| scheme),
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn archive_locator(&self) -> Option<&ArchiveLocator> {
        match self {
            Self::Archive { locator, .. } => Some(locator),
            _ => None,
        }
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.archive_locator().and_then(ArchiveLocator::path)
    }

    pub fn entry_path(&self) -> Option<&str> {
        match self {
            Self::Archive { entry, .. } => Some(entry),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(dir) => write!(f, "{FILE_SCHEME}:{}", dir.display()),
            Self::Archive { locator, entry } => {
                write!(f, "{JAR_SCHEME}:{locator}{JAR_SEPARATOR}{entry}")
            }
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// What a scan needs from the environment that hosts the classes.
pub trait ClassLoader {
    /// Every root that contains `package_path` (slash separated), in lookup order.
    fn resources(&self, package_path: &str) -> Result<Vec<ResourceUrl>>;

    /// Loads a class by its dotted name; `None` when it cannot be loaded.
    fn load_class(&self, name: &str) -> Option<LoadedClass>;

    /// An archive the loader already holds open.
    fn mounted_archive(&self, _locator: &ArchiveLocator) -> Option<ArchiveBytes> {
        None
    }
}

#[derive(Clone)]
struct SharedBytes(ArchiveBytes);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        (*self.0).as_ref()
    }
}

/// An archive whose central directory has been read once. Cloning the
/// `ZipArchive` shares the parsed entry table.
struct OpenedArchive {
    bytes: ArchiveBytes,
    zip: ZipArchive<Cursor<SharedBytes>>,
}

enum Root {
    Directory(PathBuf),
    Archive {
        path: PathBuf,
        opened: OnceLock<OpenedArchive>,
    },
    Mounted {
        name: String,
        bytes: ArchiveBytes,
        opened: OnceLock<OpenedArchive>,
    },
}

impl Root {
    fn locator(&self) -> Option<ArchiveLocator> {
        match self {
            Root::Directory(_) => None,
            Root::Archive { path, .. } => Some(ArchiveLocator::File(path.clone())),
            Root::Mounted { name, .. } => Some(ArchiveLocator::Memory(name.clone())),
        }
    }

    /// Maps and indexes the archive on first use.
    fn opened(&self) -> Result<Option<&OpenedArchive>> {
        let cell = match self {
            Root::Directory(_) => return Ok(None),
            Root::Archive { opened, .. } | Root::Mounted { opened, .. } => opened,
        };
        if let Some(hit) = cell.get() {
            return Ok(Some(hit));
        }

        let bytes: ArchiveBytes = match self {
            Root::Directory(_) => return Ok(None),
            Root::Archive { path, .. } => Arc::new(map_archive(path)?),
            Root::Mounted { bytes, .. } => Arc::clone(bytes),
        };
        let zip = ZipArchive::new(Cursor::new(SharedBytes(Arc::clone(&bytes))))
            .context("failed to read zip structure")?;
        Ok(Some(cell.get_or_init(|| OpenedArchive { bytes, zip })))
    }
}

/// An ordered set of class directories and archives.
#[derive(Default)]
pub struct Classpath {
    roots: Vec<Root>,
    loaded: Mutex<HashMap<String, Option<LoadedClass>>>,
}

impl fmt::Debug for Classpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roots: Vec<String> = self
            .roots
            .iter()
            .map(|r| match r {
                Root::Directory(p) => p.display().to_string(),
                other => other.locator().map(|l| l.to_string()).unwrap_or_default(),
            })
            .collect();
        f.debug_struct("Classpath").field("roots", &roots).finish()
    }
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_directory(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.roots.push(Root::Directory(dir.into()));
        self
    }

    pub fn add_archive(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.roots.push(Root::Archive {
            path: path.into(),
            opened: OnceLock::new(),
        });
        self
    }

    /// Mounts an in-memory archive, addressed as `jar:mem:<name>!/…`.
    pub fn mount_archive(
        &mut self,
        name: &str,
        bytes: impl AsRef<[u8]> + Send + Sync + 'static,
    ) -> &mut Self {
        self.roots.push(Root::Mounted {
            name: name.to_string(),
            bytes: Arc::new(bytes),
            opened: OnceLock::new(),
        });
        self
    }

    /// Adds a path as a directory or archive root. Missing paths are skipped.
    pub fn add_entry(&mut self, path: &Path) -> bool {
        if path.is_dir() {
            self.add_directory(path);
            true
        } else if path.is_file() {
            self.add_archive(path);
            true
        } else {
            log::warn!("classpath entry does not exist, skipping: {}", path.display());
            false
        }
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Bytes of `class_path` from the first root that can supply them.
    /// Roots that fail to read are logged and passed over.
    fn read_class_bytes(&self, class_path: &str) -> Option<Vec<u8>> {
        for root in &self.roots {
            let found = match root {
                Root::Directory(dir) => {
                    let file = dir.join(class_path);
                    if !file.is_file() {
                        continue;
                    }
                    std::fs::read(&file)
                        .with_context(|| format!("failed to read class file: {}", file.display()))
                }
                archive => match read_archive_entry(archive, class_path) {
                    Ok(Some(bytes)) => Ok(bytes),
                    Ok(None) => continue,
                    Err(err) => Err(err),
                },
            };

            match found {
                Ok(bytes) => return Some(bytes),
                Err(err) => log::debug!("{err:#}"),
            }
        }
        None
    }

    fn lock_loaded(&self) -> MutexGuard<'_, HashMap<String, Option<LoadedClass>>> {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn define_class(&self, name: &str) -> Option<LoadedClass> {
        let class_path = format!("{}{CLASS_SUFFIX}", package_path(name));
        let bytes = self.read_class_bytes(&class_path)?;
        match ClassInfo::parse(&bytes) {
            Ok(info) if info.name == name => Some(Arc::new(info)),
            Ok(info) => {
                log::debug!("{class_path} declares {} instead of {name}", info.name);
                None
            }
            Err(err) => {
                log::debug!("malformed class file {class_path}: {err}");
                None
            }
        }
    }
}

fn read_archive_entry(root: &Root, class_path: &str) -> Result<Option<Vec<u8>>> {
    let locator = root.locator().map(|l| l.to_string()).unwrap_or_default();
    let Some(opened) = root
        .opened()
        .with_context(|| format!("failed to open archive {locator}"))?
    else {
        return Ok(None);
    };
    let mut zip = opened.zip.clone();
    let mut entry = match zip.by_name(class_path) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read entry {class_path} in {locator}"));
        }
    };
    let mut out = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut out)
        .with_context(|| format!("failed to inflate entry {class_path} in {locator}"))?;
    Ok(Some(out))
}

impl ClassLoader for Classpath {
    fn resources(&self, package_path: &str) -> Result<Vec<ResourceUrl>> {
        let package_path = package_path.trim_matches('/');
        let prefix = format!("{package_path}/");
        let mut urls = Vec::new();

        for root in &self.roots {
            match root {
                Root::Directory(dir) => {
                    let candidate = dir.join(package_path);
                    if candidate.is_dir() {
                        urls.push(ResourceUrl::for_directory(&candidate));
                    }
                }
                archive => {
                    let Some(locator) = archive.locator() else { continue };
                    let opened = archive
                        .opened()
                        .with_context(|| format!("failed to open archive {locator}"))?;
                    let Some(opened) = opened else { continue };
                    if opened.zip.file_names().any(|name| name.starts_with(&prefix)) {
                        urls.push(ResourceUrl::for_archive_entry(locator, package_path));
                    }
                }
            }
        }

        Ok(urls)
    }

    fn load_class(&self, name: &str) -> Option<LoadedClass> {
        if let Some(hit) = self.lock_loaded().get(name) {
            return hit.clone();
        }

        let class = self.define_class(name);

        // Another thread may have defined it meanwhile; keep the first.
        self.lock_loaded()
            .entry(name.to_string())
            .or_insert(class)
            .clone()
    }

    fn mounted_archive(&self, locator: &ArchiveLocator) -> Option<ArchiveBytes> {
        let root = self
            .roots
            .iter()
            .find(|r| r.locator().as_ref() == Some(locator))?;
        match root.opened() {
            Ok(opened) => opened.map(|o| Arc::clone(&o.bytes)),
            Err(err) => {
                log::debug!("mounted archive {locator} unavailable: {err:#}");
                None
            }
        }
    }
}

pub(crate) fn map_archive(path: &Path) -> Result<Mmap> {
    let file = File::open(path).with_context(|| format!("failed to open jar: {}", path.display()))?;
    // SAFETY: The file is opened read-only and remains valid for the lifetime of the mmap.
    unsafe { Mmap::map(&file) }.with_context(|| format!("mmap jar failed: {}", path.display()))
}

pub(crate) fn open_zip(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    Ok(ZipArchive::new(Cursor::new(bytes))?)
}
