//! Integration tests for volcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn volcache() -> Command {
        let mut cmd = cargo_bin_cmd!("volcache");
        for key in [
            "GITHUB_ACTIONS",
            "VOLCACHE_ROOT",
            "VOLCACHE_PATHS",
            "VOLCACHE_MODES",
            "VOLCACHE_DETECT",
            "VOLCACHE_CONFIG",
            "VOLCACHE_STRATEGY",
            "VOLCACHE_ELEVATE",
            "VOLCACHE_STATE_DIR",
            "VOLCACHE_FAIL_ON_CACHE_MISS",
            "RUST_LOG",
        ] {
            cmd.env_remove(key);
        }
        cmd
    }

    #[test]
    fn help_displays() {
        volcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("persistent cache volumes"))
            .stdout(predicate::str::contains("attach"))
            .stdout(predicate::str::contains("validate"));
    }

    #[test]
    fn version_displays() {
        volcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("volcache"));
    }

    #[test]
    fn attach_without_volume_fails_with_hint() {
        let dir = tempfile::TempDir::new().unwrap();
        volcache()
            .args(["attach", "--path", "/tmp/mydata"])
            .current_dir(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("VOLCACHE_ROOT"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn validate_without_state_succeeds() {
        let dir = tempfile::TempDir::new().unwrap();
        volcache()
            .args(["validate", "--state-dir"])
            .arg(dir.path())
            .env("GITHUB_RUN_ID", "no-state")
            .assert()
            .success()
            .stdout(predicate::str::contains("No attached cache paths"));
    }

    #[test]
    fn malformed_config_fails_attach() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(".volcache.toml"), "[cache\n").unwrap();
        volcache()
            .arg("attach")
            .current_dir(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}

mod cycle_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Job {
        dir: TempDir,
    }

    impl Job {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            for sub in ["volume", "home", "ws", "state"] {
                fs::create_dir_all(dir.path().join(sub)).unwrap();
            }
            Self { dir }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn cmd(&self, phase: &str) -> Command {
            let mut cmd = cargo_bin_cmd!("volcache");
            cmd.env_remove("GITHUB_ACTIONS")
                .env_remove("RUST_LOG")
                .env("HOME", self.path("home"))
                .env("GITHUB_RUN_ID", "cycle")
                .arg(phase)
                .args(["--strategy", "symlink", "--elevate", "never", "--state-dir"])
                .arg(self.path("state"))
                .current_dir(self.path("ws"));
            cmd
        }

        fn attach(&self, paths: &str) -> Command {
            let mut cmd = self.cmd("attach");
            cmd.arg("--volume-root")
                .arg(self.path("volume"))
                .args(["--path", paths]);
            cmd
        }
    }

    fn is_symlink(path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    #[test]
    fn attach_then_validate() {
        let job = Job::new();
        let data = job.path("ws/data");

        job.attach(&format!("{},~/.cache/tool", data.display()))
            .assert()
            .success()
            .stdout(predicate::str::contains("Attached 2 cache path(s)"))
            .stdout(predicate::str::contains("Some cache paths missing"));

        assert!(is_symlink(&data));
        assert!(is_symlink(&job.path("home/.cache/tool")));
        let cache_side = job.path("volume").join(data.strip_prefix("/").unwrap());
        assert_eq!(fs::read_link(&data).unwrap(), cache_side);
        assert!(job.path("volume/.volcache-metadata.json").is_file());

        job.cmd("validate")
            .assert()
            .success()
            .stdout(predicate::str::contains("cached"))
            .stdout(predicate::str::contains("warning").not());
    }

    #[test]
    fn second_attach_is_a_cache_hit() {
        let job = Job::new();
        let data = job.path("ws/data").display().to_string();

        job.attach(&data).assert().success();
        job.cmd("validate").assert().success();

        job.attach(&data)
            .arg("--fail-on-cache-miss")
            .assert()
            .success()
            .stdout(predicate::str::contains("All cache paths found and restored"));
    }

    #[test]
    fn fail_on_cache_miss_fails_first_run() {
        let job = Job::new();
        job.attach(&job.path("ws/data").display().to_string())
            .arg("--fail-on-cache-miss")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cache miss"));
    }

    #[test]
    fn deleted_target_warns_but_succeeds() {
        let job = Job::new();
        let data = job.path("ws/data");

        job.attach(&data.display().to_string()).assert().success();
        fs::remove_file(&data).unwrap();

        job.cmd("validate")
            .assert()
            .success()
            .stdout(predicate::str::contains("does not exist any more"))
            .stdout(predicate::str::contains("Troubleshooting"));
    }

    #[test]
    fn trailing_slash_path_round_trips() {
        let job = Job::new();
        let data = job.path("ws/data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("keep"), "x").unwrap();

        job.attach(&format!("{}/", data.display()))
            .assert()
            .success();
        assert!(is_symlink(&data));

        job.cmd("validate")
            .assert()
            .success()
            .stdout(predicate::str::contains("warning").not());
    }

    #[test]
    fn unknown_mode_is_skipped() {
        let job = Job::new();
        job.attach(&job.path("ws/data").display().to_string())
            .args(["--mode", "foobar"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Skipping cache mode foobar"))
            .stdout(predicate::str::contains("Attached 1 cache path(s)"));
    }
}
