use assert_cmd::{cargo::cargo_bin_cmd, Command};
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Output};
use tempfile::TempDir;

/// A git repository wired to the git-age filter, with an isolated home
/// directory so no user configuration leaks into the tests.
pub struct TestRepo {
    pub dir: TempDir,
    pub home: TempDir,
}

#[allow(dead_code)]
impl TestRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Identities file used by every git-age invocation of this repository
    pub fn keys_path(&self) -> PathBuf {
        self.home.path().join("keys.txt")
    }

    /// Global git config honoured by both git and `git-age install`
    pub fn global_config_path(&self) -> PathBuf {
        self.home.path().join(".gitconfig")
    }

    /// Write the user settings file read by git-age
    pub fn write_config(&self, contents: &str) {
        let dir = self.home.path().join(".config/git-age");
        std::fs::create_dir_all(&dir).expect("failed to create config dir");
        std::fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }

    fn apply_env(&self, cmd: &mut StdCommand) {
        cmd.current_dir(self.path())
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.home.path().join(".config"))
            .env("GIT_CONFIG_GLOBAL", self.global_config_path())
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_AGE_KEYS", self.keys_path())
            .env_remove("GIT_AGE_AGENT_HOST")
            .env_remove("GIT_AGE_KEYRING_SERVICE")
            .env_remove("RUST_LOG");
    }

    /// git-age running inside the repository
    pub fn git_age(&self) -> Command {
        let mut std_cmd = StdCommand::new(git_age_bin());
        self.apply_env(&mut std_cmd);
        Command::from_std(std_cmd)
    }

    /// Run git inside the repository and return its output
    pub fn git(&self, args: &[&str]) -> Output {
        let mut cmd = StdCommand::new("git");
        self.apply_env(&mut cmd);
        cmd.args(args).output().expect("failed to run git")
    }

    /// Run git and fail the test unless it succeeds
    pub fn git_ok(&self, args: &[&str]) -> String {
        let output = self.git(args);
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    pub fn write(&self, name: &str, contents: &[u8]) {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        std::fs::write(path, contents).expect("failed to write file");
    }

    pub fn read(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.path().join(name)).expect("failed to read file")
    }

    /// Blob content of `name` as stored in HEAD
    pub fn head_blob(&self, name: &str) -> Vec<u8> {
        let mut cmd = StdCommand::new("git");
        self.apply_env(&mut cmd);
        let output = cmd
            .args(["cat-file", "blob", &format!("HEAD:{name}")])
            .output()
            .expect("failed to run git cat-file");
        assert!(output.status.success(), "{name} is not in HEAD");
        output.stdout
    }

    /// Initialize git-age and track `*.env`, committing the setup
    pub fn init_and_track(&self) {
        self.git_age().arg("init").assert().success();
        self.git_age()
            .args(["files", "track", "*.env"])
            .assert()
            .success();
        self.git_ok(&["add", ".gitattributes", ".agerecipients"]);
        self.git_ok(&["commit", "-m", "setup git-age"]);
    }
}

/// Create a new temporary git repository with user config set and the
/// `age` filter driver pointing at the test binary.
pub fn create_git_repo() -> TestRepo {
    let repo = TestRepo {
        dir: TempDir::new().expect("failed to create temp dir"),
        home: TempDir::new().expect("failed to create home dir"),
    };

    repo.git_ok(&["init", "-q"]);
    repo.git_ok(&["config", "user.email", "test@example.com"]);
    repo.git_ok(&["config", "user.name", "Test User"]);

    let program = format!("'{}'", git_age_bin());
    repo.git_ok(&["config", "filter.age.clean", &format!("{program} clean -- %f")]);
    repo.git_ok(&["config", "filter.age.smudge", &format!("{program} smudge -- %f")]);
    repo.git_ok(&["config", "filter.age.required", "true"]);

    repo
}

/// Convenience helper for spawning the git-age binary via assert_cmd.
#[allow(dead_code)]
pub fn git_age_cmd() -> Command {
    cargo_bin_cmd!("git-age")
}

/// Absolute path to the git-age test binary.
pub fn git_age_bin() -> &'static str {
    env!("CARGO_BIN_EXE_git-age")
}
