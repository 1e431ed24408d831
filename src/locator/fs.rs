//! A locator over a directory tree.

use super::ContentLocator;
use crate::error::LocatorError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Serves files below `base`, addressed by their `/`-separated relative path.
///
/// Enumeration walks the tree in file-name order, so it is stable across runs.
/// Archive-member paths (`x.zip!/y`) are not looked into.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    base: PathBuf,
}

impl DirectoryLocator {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, LocatorError> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(LocatorError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(self.base.join(relative))
    }

    fn relative_name(&self, full: &Path) -> Option<String> {
        let relative = full.strip_prefix(&self.base).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

impl ContentLocator for DirectoryLocator {
    fn exists(&self, path: &str) -> Result<bool, LocatorError> {
        let full = match self.resolve(path) {
            Ok(full) => full,
            Err(_) => return Ok(false),
        };
        match std::fs::metadata(&full) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LocatorError::Unavailable {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, LocatorError> {
        let full = self.resolve(path)?;
        std::fs::read(full).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LocatorError::NotFound {
                path: path.to_string(),
            },
            _ => LocatorError::Io(e),
        })
    }

    fn enumerate<'a>(&'a self, root: &str) -> Box<dyn Iterator<Item = String> + 'a> {
        let root = root.to_string();
        Box::new(
            WalkDir::new(&self.base)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .filter_map(move |entry| self.relative_name(entry.path()))
                .filter(move |name| name.starts_with(&root)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_directory_locator() {
        let dir = tempfile::tempdir().unwrap();
        let article = dir.path().join("JAP/v111/i11/112601_1");
        std::fs::create_dir_all(article.join("Markup")).unwrap();
        std::fs::create_dir_all(article.join("Page_Renditions")).unwrap();
        std::fs::write(article.join("Markup/VOR_1.xml"), "<article/>").unwrap();
        std::fs::write(article.join("Page_Renditions/online.pdf"), "%PDF").unwrap();
        std::fs::write(dir.path().join("README"), "x").unwrap();

        let locator = DirectoryLocator::new(dir.path());
        let paths: Vec<_> = locator.enumerate("JAP/").collect();
        assert_eq!(
            paths,
            vec![
                "JAP/v111/i11/112601_1/Markup/VOR_1.xml",
                "JAP/v111/i11/112601_1/Page_Renditions/online.pdf",
            ]
        );
        assert_eq!(locator.enumerate("").count(), 3);

        assert!(locator.exists("JAP/v111/i11/112601_1/Markup/VOR_1.xml").unwrap());
        assert!(!locator.exists("JAP/v111/i11/112601_1/Markup").unwrap());
        assert!(!locator.exists("JAP/missing.pdf").unwrap());
        assert!(!locator.exists("../escape").unwrap());
        assert_eq!(
            locator.read("JAP/v111/i11/112601_1/Page_Renditions/online.pdf").unwrap(),
            b"%PDF".to_vec()
        );
        assert!(matches!(
            locator.read("JAP/missing.pdf"),
            Err(LocatorError::NotFound { .. })
        ));
    }
}
