/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Template loader: resolves a template string or file reference, loads it
//! once, and caches it. The templating language itself — how `{{ }}`-style
//! placeholders or loops are interpreted — is an external collaborator the
//! core relies on but does not define; this module only owns getting the
//! source text safely off disk (or accepting it inline) and not re-reading
//! it on every render.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::LiveViewError;

/// Where a component's template text comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TemplateSource {
    /// The template text is already in memory (e.g. a `&str` literal in the component).
    Inline(String),
    /// The template lives on disk, named relative to the loader's configured root.
    File(PathBuf),
}

/// Resolves a caller-supplied relative path against `root`, refusing any
/// path that escapes it — whether via `..` segments or via a symlink that
/// points outside the root once resolved.
fn resolve_safe_path(root: &Path, relative: &Path) -> Result<PathBuf, LiveViewError> {
    if relative.is_absolute() {
        return Err(LiveViewError::TemplateInvalid(format!(
            "template path must be relative: {}",
            relative.display()
        )));
    }
    let joined = root.join(relative);
    let canonical_root = std::fs::canonicalize(root)
        .map_err(|_| LiveViewError::TemplateNotFound(relative.display().to_string()))?;
    let canonical = std::fs::canonicalize(&joined)
        .map_err(|_| LiveViewError::TemplateNotFound(relative.display().to_string()))?;
    if !canonical.starts_with(&canonical_root) {
        return Err(LiveViewError::TemplateInvalid(format!(
            "template path escapes root: {}",
            relative.display()
        )));
    }
    Ok(canonical)
}

/// Loads and caches template source text. Safe to share across sessions: one
/// loader per process, guarded by a reader-writer lock held only across the
/// cache lookup/insert, never across disk I/O.
pub struct TemplateLoader {
    root: PathBuf,
    cache: RwLock<HashMap<PathBuf, Arc<str>>>,
}

impl TemplateLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        TemplateLoader {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves `source` to its text, parsing (loading) it only on first use.
    pub fn load(&self, source: &TemplateSource) -> Result<Arc<str>, LiveViewError> {
        match source {
            TemplateSource::Inline(text) => Ok(Arc::from(text.as_str())),
            TemplateSource::File(relative) => self.load_file(relative),
        }
    }

    fn load_file(&self, relative: &Path) -> Result<Arc<str>, LiveViewError> {
        let canonical = resolve_safe_path(&self.root, relative)?;
        if let Some(cached) = self.cache.read().get(&canonical) {
            return Ok(cached.clone());
        }
        let text = std::fs::read_to_string(&canonical)
            .map_err(|_| LiveViewError::TemplateNotFound(relative.display().to_string()))?;
        let text: Arc<str> = Arc::from(text);
        self.cache.write().insert(canonical, text.clone());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "liveview-template-test-{}",
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn loads_inline_template_without_touching_disk() {
        let loader = TemplateLoader::new("/nonexistent");
        let source = TemplateSource::Inline("<div>{{n}}</div>".to_string());
        assert_eq!(&*loader.load(&source).unwrap(), "<div>{{n}}</div>");
    }

    #[test]
    fn loads_and_caches_file_template() {
        let root = tempdir();
        fs::write(root.join("counter.html"), "<button>{{n}}</button>").unwrap();
        let loader = TemplateLoader::new(&root);
        let source = TemplateSource::File(PathBuf::from("counter.html"));
        let first = loader.load(&source).unwrap();
        assert_eq!(&*first, "<button>{{n}}</button>");
        // second load comes from cache; mutate the file and confirm the cached copy is returned
        fs::write(root.join("counter.html"), "changed").unwrap();
        let second = loader.load(&source).unwrap();
        assert_eq!(&*second, "<button>{{n}}</button>");
    }

    #[test]
    fn missing_file_fails_with_template_not_found() {
        let root = tempdir();
        let loader = TemplateLoader::new(&root);
        let source = TemplateSource::File(PathBuf::from("missing.html"));
        assert!(matches!(
            loader.load(&source),
            Err(LiveViewError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn refuses_path_traversal_outside_root() {
        let root = tempdir();
        fs::create_dir_all(root.join("sub")).unwrap();
        let secret_dir = tempdir();
        fs::write(secret_dir.join("secret.html"), "leak").unwrap();
        let loader = TemplateLoader::new(root.join("sub"));
        let traversal = PathBuf::from("..").join("..").join(
            secret_dir.file_name().unwrap(),
        ).join("secret.html");
        let result = loader.load(&TemplateSource::File(traversal));
        assert!(result.is_err());
    }

    #[test]
    fn refuses_absolute_paths() {
        let root = tempdir();
        let loader = TemplateLoader::new(&root);
        let result = loader.load(&TemplateSource::File(PathBuf::from("/etc/passwd")));
        assert!(matches!(result, Err(LiveViewError::TemplateInvalid(_))));
    }
}
