//! Bulk re-encryption of every tracked file.
//!
//! When the recipient set changes, the committed ciphertext of each tracked
//! path is opened with the current identities and sealed again for the
//! current recipients. Per path:
//!
//! 1. read the blob at HEAD, skipping paths that were never committed
//! 2. seal its plaintext into a temp file next to the target while teeing the
//!    plaintext into a second temp file
//! 3. rename the ciphertext over the target and stage it
//! 4. rename the plaintext over the target so the working tree stays readable
//!
//! Paths are processed one after the other because the index is not safe for
//! concurrent mutation. A failing path does not stop the walk; failures are
//! collected in the [`ReencryptReport`].

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::crypto::Sealer;
use crate::error::{GitAgeError, Result};
use crate::fsx::{self, TeeReader};
use crate::git::Repository;

#[derive(Debug, Default)]
pub struct ReencryptReport {
    /// Paths sealed again and staged
    pub reencrypted: Vec<PathBuf>,
    /// Tracked paths without a committed version
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, GitAgeError)>,
}

impl ReencryptReport {
    /// Join all per-path failures into one error
    pub fn into_result(self) -> Result<()> {
        let errors = self
            .failures
            .into_iter()
            .map(|(path, err)| {
                GitAgeError::Other(format!("Failed to re-encrypt {}: {err}", path.display()))
            })
            .collect();
        match GitAgeError::join(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Re-seal every tracked file of `repo`, whose working tree is rooted at `root`
pub fn reencrypt_tracked_files(
    repo: &dyn Repository,
    root: &Path,
    sealer: &Sealer,
) -> Result<ReencryptReport> {
    let mut report = ReencryptReport::default();

    repo.walk_tracked_files(&mut |path| {
        info!(path = %path.display(), "Re-encrypting file");
        match reencrypt_file(repo, root, sealer, path) {
            Ok(true) => report.reencrypted.push(path.to_path_buf()),
            Ok(false) => report.skipped.push(path.to_path_buf()),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to re-encrypt file");
                report.failures.push((path.to_path_buf(), err));
            }
        }
        Ok(())
    })?;

    Ok(report)
}

/// Returns `false` when `path` has no committed version
fn reencrypt_file(
    repo: &dyn Repository,
    root: &Path,
    sealer: &Sealer,
    path: &Path,
) -> Result<bool> {
    debug!(path = %path.display(), "Checking if file was already present at HEAD");
    let Some(stored) = repo.open_object_at_head(path)? else {
        return Ok(false);
    };

    let dest = root.join(path);
    let mut plaintext_tmp = fsx::sibling_tempfile(&dest)?;
    let mut sealed_tmp = fsx::sibling_tempfile(&dest)?;
    debug!(
        path = %path.display(),
        tmp_file_path = %plaintext_tmp.path().display(),
        "Preserve decrypted file in temp file"
    );

    {
        let source: Box<dyn Read + '_> = if Sealer::is_encrypted(&stored) {
            Box::new(sealer.open(stored.as_slice())?)
        } else {
            warn!(path = %path.display(), "Object at HEAD is not encrypted, sealing it as is");
            Box::new(stored.as_slice())
        };

        let mut writer = sealer.seal(sealed_tmp.as_file_mut())?;
        io::copy(
            &mut TeeReader::new(source, plaintext_tmp.as_file_mut()),
            &mut writer,
        )?;
        writer.finish()?;
    }
    sealed_tmp.as_file().sync_all()?;
    plaintext_tmp.as_file().sync_all()?;

    // Both forms take the target's mode; libgit2 records the executable bit when staging
    if let Ok(metadata) = fs::metadata(&dest) {
        fs::set_permissions(sealed_tmp.path(), metadata.permissions())?;
        fs::set_permissions(plaintext_tmp.path(), metadata.permissions())?;
    }

    fsx::replace(sealed_tmp, &dest)?;
    let staged = repo.stage_file(path);
    fsx::replace(plaintext_tmp, &dest)?;
    staged?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::{open_bytes, seal_bytes};
    use crate::crypto::Identity;
    use crate::git::tests::{commit_files, head_filemode, init_repo};
    use crate::git::{HeadObjectOpener, GIT_ATTRIBUTES_FILE_NAME, TRACK_ATTRIBUTES};

    const ATTRIBUTES: &str = "*.env filter=age diff=age merge=age -text\n";

    #[test]
    fn test_expanded_recipients_can_open_every_file() {
        let (_temp, repo) = init_repo();
        let alice = Identity::generate();
        let bob = Identity::generate();
        let before = Sealer::new(vec![alice.to_public()], vec![alice.clone()]);

        commit_files(
            &repo,
            &[
                (GIT_ATTRIBUTES_FILE_NAME, ATTRIBUTES.as_bytes()),
                ("app.env", &seal_bytes(&before, b"APP=1\n")),
                ("db/prod.env", &seal_bytes(&before, b"DB=2\n")),
            ],
            "initial",
        );
        fs::write(repo.root().join("app.env"), b"APP=1\n").unwrap();
        fs::write(repo.root().join("db/prod.env"), b"DB=2\n").unwrap();

        let mut after = before.clone();
        after.add_recipients([bob.to_public()]);
        let report = reencrypt_tracked_files(&repo, repo.root(), &after).unwrap();
        repo.commit("re-encrypt").unwrap();

        assert_eq!(
            report.reencrypted,
            vec![PathBuf::from("app.env"), PathBuf::from("db/prod.env")]
        );
        assert!(report.failures.is_empty());

        let bob_only = Sealer::new(Vec::new(), vec![bob]);
        let alice_only = Sealer::new(Vec::new(), vec![alice]);
        for (path, plain) in [("app.env", &b"APP=1\n"[..]), ("db/prod.env", &b"DB=2\n"[..])] {
            let stored = repo.open_object_at_head(Path::new(path)).unwrap().unwrap();
            assert_eq!(open_bytes(&bob_only, &stored).unwrap(), plain);
            assert_eq!(open_bytes(&alice_only, &stored).unwrap(), plain);
            assert_eq!(fs::read(repo.root().join(path)).unwrap(), plain);
        }
    }

    #[test]
    fn test_uncommitted_files_are_skipped() {
        let (_temp, repo) = init_repo();
        let identity = Identity::generate();
        let sealer = Sealer::new(vec![identity.to_public()], vec![identity]);
        commit_files(
            &repo,
            &[(GIT_ATTRIBUTES_FILE_NAME, ATTRIBUTES.as_bytes())],
            "attributes",
        );
        fs::write(repo.root().join("new.env"), b"NEW=1\n").unwrap();

        let report = reencrypt_tracked_files(&repo, repo.root(), &sealer).unwrap();

        assert_eq!(report.skipped, vec![PathBuf::from("new.env")]);
        assert!(report.reencrypted.is_empty());
        assert_eq!(fs::read(repo.root().join("new.env")).unwrap(), b"NEW=1\n");
        assert!(!repo.is_staging_dirty().unwrap());
    }

    #[test]
    fn test_failure_does_not_stop_the_walk() {
        let (_temp, repo) = init_repo();
        let ours = Identity::generate();
        let foreign = Identity::generate();
        let sealer = Sealer::new(vec![ours.to_public()], vec![ours.clone()]);
        let foreign_sealer = Sealer::new(vec![foreign.to_public()], vec![foreign]);

        commit_files(
            &repo,
            &[
                (GIT_ATTRIBUTES_FILE_NAME, ATTRIBUTES.as_bytes()),
                ("a.env", &seal_bytes(&foreign_sealer, b"A=1\n")),
                ("b.env", &seal_bytes(&sealer, b"B=2\n")),
            ],
            "initial",
        );
        fs::write(repo.root().join("a.env"), b"A=1\n").unwrap();
        fs::write(repo.root().join("b.env"), b"B=2\n").unwrap();

        let report = reencrypt_tracked_files(&repo, repo.root(), &sealer).unwrap();

        assert_eq!(report.reencrypted, vec![PathBuf::from("b.env")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, PathBuf::from("a.env"));
        assert_eq!(fs::read(repo.root().join("a.env")).unwrap(), b"A=1\n");

        let leftovers: Vec<_> = fs::read_dir(repo.root())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".a.env.") || name.starts_with(".b.env."))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");

        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("a.env"));
    }

    #[test]
    fn test_plaintext_head_is_sealed() {
        let (_temp, repo) = init_repo();
        let identity = Identity::generate();
        let sealer = Sealer::new(vec![identity.to_public()], vec![identity]);
        commit_files(
            &repo,
            &[
                (
                    GIT_ATTRIBUTES_FILE_NAME,
                    format!("legacy.env {TRACK_ATTRIBUTES}\n").as_bytes(),
                ),
                ("legacy.env", b"LEGACY=1\n"),
            ],
            "plaintext history",
        );

        let report = reencrypt_tracked_files(&repo, repo.root(), &sealer).unwrap();
        repo.commit("seal legacy").unwrap();

        assert_eq!(report.reencrypted, vec![PathBuf::from("legacy.env")]);
        let stored = repo
            .open_object_at_head(Path::new("legacy.env"))
            .unwrap()
            .unwrap();
        assert_eq!(open_bytes(&sealer, &stored).unwrap(), b"LEGACY=1\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_are_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp, repo) = init_repo();
        let identity = Identity::generate();
        let sealer = Sealer::new(vec![identity.to_public()], vec![identity]);
        commit_files(
            &repo,
            &[
                (GIT_ATTRIBUTES_FILE_NAME, ATTRIBUTES.as_bytes()),
                ("run.env", &seal_bytes(&sealer, b"RUN=1\n")),
            ],
            "initial",
        );
        let dest = repo.root().join("run.env");
        fs::write(&dest, b"RUN=1\n").unwrap();
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o644)).unwrap();

        reencrypt_tracked_files(&repo, repo.root(), &sealer).unwrap();

        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_survives_in_history() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp, repo) = init_repo();
        let identity = Identity::generate();
        let sealer = Sealer::new(vec![identity.to_public()], vec![identity]);
        commit_files(
            &repo,
            &[
                (GIT_ATTRIBUTES_FILE_NAME, ATTRIBUTES.as_bytes()),
                ("run.env", &seal_bytes(&sealer, b"RUN=1\n")),
            ],
            "initial",
        );
        let dest = repo.root().join("run.env");
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o755)).unwrap();
        repo.stage_file(Path::new("run.env")).unwrap();
        repo.commit("make executable").unwrap();
        assert_eq!(head_filemode(&repo, "run.env"), 0o100755);

        fs::write(&dest, b"RUN=1\n").unwrap();
        reencrypt_tracked_files(&repo, repo.root(), &sealer).unwrap();
        repo.commit("re-encrypt").unwrap();

        assert_eq!(head_filemode(&repo, "run.env"), 0o100755);
        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
