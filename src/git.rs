//! Repository access through libgit2.
//!
//! Everything the filters and the re-encryption pipeline need from Git sits
//! behind the [`Repository`] trait; [`GitRepo`] is the `git2` implementation.
//! Paths are relative to the repository root.

use std::fs;
use std::path::{Path, PathBuf};

use git2::{AttrCheckFlags, ErrorCode, Status, StatusOptions};
use tracing::debug;

use crate::error::{GitAgeError, Result};

/// Value of the `filter` attribute selecting files for encryption
pub const FILTER_NAME: &str = "age";

/// Attributes appended to `.gitattributes` for a tracked pattern
pub const TRACK_ATTRIBUTES: &str = "filter=age diff=age merge=age -text";

pub const GIT_ATTRIBUTES_FILE_NAME: &str = ".gitattributes";

/// Lookup of committed content, the only repository access the clean filter needs
pub trait HeadObjectOpener {
    /// Content of the blob committed at HEAD for `path`, `None` if there is none
    fn open_object_at_head(&self, path: &Path) -> Result<Option<Vec<u8>>>;
}

pub trait Repository: HeadObjectOpener {
    /// Add the working tree content of `path` to the index
    fn stage_file(&self, path: &Path) -> Result<()>;

    /// Commit the index on top of HEAD
    fn commit(&self, message: &str) -> Result<()>;

    /// Whether the index differs from HEAD
    fn is_staging_dirty(&self) -> Result<bool>;

    /// Call `visit` for every working tree file whose `filter` attribute is `age`,
    /// in sorted directory order
    fn walk_tracked_files(&self, visit: &mut dyn FnMut(&Path) -> Result<()>) -> Result<()>;
}

pub struct GitRepo {
    repo: git2::Repository,
    root: PathBuf,
}

impl GitRepo {
    /// Open the repository containing `path`
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let repo = git2::Repository::discover(path).map_err(|_| GitAgeError::NotInGitRepo)?;
        let root = repo
            .workdir()
            .ok_or_else(|| GitAgeError::Other("Repository has no working directory".into()))?
            .to_path_buf();
        Ok(Self { repo, root })
    }

    /// Root of the working tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// URLs of all configured remotes
    pub fn remotes(&self) -> Result<Vec<String>> {
        let names = self.repo.remotes()?;
        let mut urls = Vec::with_capacity(names.len());
        for name in names.iter().flatten() {
            if let Some(url) = self.repo.find_remote(name)?.url() {
                urls.push(url.to_string());
            }
        }
        Ok(urls)
    }

    /// `path` relative to the working tree root
    pub fn relative(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            if let Ok(stripped) = path.strip_prefix(&self.root) {
                return stripped.to_path_buf();
            }
        }
        path.to_path_buf()
    }

    fn is_tracked(&self, path: &Path) -> Result<bool> {
        let filter = self
            .repo
            .get_attr(path, "filter", AttrCheckFlags::FILE_THEN_INDEX)?;
        Ok(filter == Some(FILTER_NAME))
    }

    fn walk_dir(
        &self,
        dir: &Path,
        visit: &mut dyn FnMut(&Path) -> Result<()>,
    ) -> Result<()> {
        let mut entries = fs::read_dir(self.root.join(dir))?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let relative = dir.join(entry.file_name());
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                if entry.file_name() == ".git" {
                    continue;
                }
                self.walk_dir(&relative, visit)?;
            } else if file_type.is_file() && self.is_tracked(&relative)? {
                visit(&relative)?;
            }
        }
        Ok(())
    }
}

impl HeadObjectOpener for GitRepo {
    fn open_object_at_head(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                debug!("Repository has no HEAD yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let tree = head.peel_to_tree()?;
        let entry = match tree.get_path(&self.relative(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match entry.to_object(&self.repo)?.into_blob() {
            Ok(blob) => Ok(Some(blob.content().to_vec())),
            Err(_) => Ok(None),
        }
    }
}

impl Repository for GitRepo {
    fn stage_file(&self, path: &Path) -> Result<()> {
        let mut index = self.repo.index()?;
        index.add_path(&self.relative(path))?;
        index.write()?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        let signature = self.repo.signature()?;
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let id = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        debug!(commit = %id, "Created commit");
        Ok(())
    }

    fn is_staging_dirty(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options
            .show(git2::StatusShow::Index)
            .include_untracked(false)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut options))?;
        let staged = Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE;
        Ok(statuses.iter().any(|entry| entry.status().intersects(staged)))
    }

    fn walk_tracked_files(&self, visit: &mut dyn FnMut(&Path) -> Result<()>) -> Result<()> {
        self.walk_dir(Path::new(""), visit)
    }
}

/// Register the filter driver in the Git config at `config_path`.
///
/// Returns `false` without writing when a `filter.age` section already exists.
pub fn install_filter_driver(config_path: &Path, program: &str) -> Result<bool> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    if !config_path.exists() {
        fs::write(config_path, "")?;
    }

    let mut config = git2::Config::open(config_path)?;
    let section = format!("filter.{FILTER_NAME}");
    let installed = ["clean", "smudge", "required"]
        .iter()
        .any(|key| config.get_entry(&format!("{section}.{key}")).is_ok());
    if installed {
        return Ok(false);
    }

    config.set_str(&format!("{section}.clean"), &format!("{program} clean -- %f"))?;
    config.set_str(&format!("{section}.smudge"), &format!("{program} smudge -- %f"))?;
    config.set_bool(&format!("{section}.required"), true)?;
    Ok(true)
}

/// Path of the user's global Git config
pub fn global_config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os("GIT_CONFIG_GLOBAL") {
        return Ok(PathBuf::from(path));
    }
    dirs::home_dir()
        .map(|home| home.join(".gitconfig"))
        .ok_or_else(|| GitAgeError::Config("Cannot determine home directory".into()))
}
