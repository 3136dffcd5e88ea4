use anyhow::{Context, Result};
use memmap2::Mmap;

use crate::classfile::CLASS_SUFFIX;
use crate::classpath::{ArchiveBytes, ClassLoader, ResourceUrl, map_archive, open_zip};
use crate::scan::{ClassAccept, ClassSet, collect_class};

enum OpenedArchive {
    Mapped(Mmap),
    Mounted(ArchiveBytes),
}

impl OpenedArchive {
    fn bytes(&self) -> &[u8] {
        match self {
            OpenedArchive::Mapped(mmap) => &mmap[..],
            OpenedArchive::Mounted(bytes) => (**bytes).as_ref(),
        }
    }
}

/// Opens the archive behind a `jar:` URL, first straight from disk and then
/// through whatever the loader already has open.
fn open_archive(loader: &dyn ClassLoader, url: &ResourceUrl) -> Result<OpenedArchive> {
    let direct = url
        .archive_path()
        .with_context(|| format!("not a file-backed archive: {url}"))
        .and_then(map_archive);

    match direct {
        Ok(mmap) => Ok(OpenedArchive::Mapped(mmap)),
        Err(err) => {
            log::debug!("direct open of {url} failed, trying mounted archive: {err:#}");
            url.archive_locator()
                .and_then(|locator| loader.mounted_archive(locator))
                .map(OpenedArchive::Mounted)
                .with_context(|| format!("cannot resolve archive for {url}: {err:#}"))
        }
    }
}

/// Collects the classes of `base_package` found in the archive behind `url`.
pub fn scan_archive(
    loader: &dyn ClassLoader,
    url: &ResourceUrl,
    base_package: &str,
    accept: Option<&dyn ClassAccept>,
    recurse: bool,
) -> Result<ClassSet> {
    let archive = open_archive(loader, url)?;
    let names = class_names_in_archive(archive.bytes(), base_package, recurse)
        .with_context(|| format!("failed to read zip structure: {url}"))?;
    drop(archive);

    let mut classes = ClassSet::new();
    for name in names {
        collect_class(loader, &name, accept, &mut classes);
    }
    Ok(classes)
}

fn class_names_in_archive(bytes: &[u8], base_package: &str, recurse: bool) -> Result<Vec<String>> {
    let mut archive = open_zip(bytes)?;
    let prefix = format!("{base_package}.");
    let mut names = Vec::new();

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let Some(stem) = entry.name().strip_suffix(CLASS_SUFFIX) else {
            continue;
        };
        let class_name = stem.replace('/', ".");
        if !class_name.starts_with(&prefix) {
            continue;
        }

        let package = class_name.rsplit_once('.').map_or("", |(p, _)| p);
        if !recurse && package != base_package {
            continue;
        }
        names.push(class_name);
    }

    names.sort();
    Ok(names)
}
