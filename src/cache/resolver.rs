//! Turns manual paths and mode tags into mapped cache path requests
//!
//! Manual paths come first, then modes in the order given. That order is
//! load-bearing: when two requests share a mount target, the later one
//! decides the final attachment. A mode that is unknown, whose
//! introspection fails, or whose output does not map onto the volume is
//! skipped with a warning. Any other error aborts the run.

use crate::cache::mapper::PathMapper;
use crate::cache::modes::introspect::CommandRunner;
use crate::cache::modes::{ModeContext, ModeRegistry};
use crate::cache::request::CachePathRequest;
use crate::error::{VolcacheError, VolcacheResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Manual path suffixes that usually indicate caching the wrong directory
const RISKY_SUFFIXES: &[&str] = &["node_modules"];

/// What the caller asked to cache
#[derive(Debug, Clone, Default)]
pub struct ResolveInput {
    /// Manual paths, tagged `custom`
    pub paths: Vec<String>,
    /// Mode tags in the order given
    pub modes: Vec<String>,
}

/// A mode that contributed nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMode {
    pub mode: String,
    pub reason: String,
}

/// Result of resolution
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Mapped requests in processing order
    pub requests: Vec<CachePathRequest>,
    /// Environment overrides, applied in order by the caller
    pub env_overrides: Vec<(String, String)>,
    /// Modes that were skipped, with the warning that was logged
    pub skipped: Vec<SkippedMode>,
    /// Advisory warnings about manual paths
    pub advisories: Vec<String>,
}

/// Resolves cache path requests against the mode registry
pub struct CacheRequestResolver {
    registry: ModeRegistry,
    runner: Arc<dyn CommandRunner>,
    mapper: PathMapper,
    working_dir: PathBuf,
    os: String,
}

impl CacheRequestResolver {
    /// Create a resolver using the built-in mode catalog
    pub fn new(mapper: PathMapper, runner: Arc<dyn CommandRunner>, working_dir: PathBuf) -> Self {
        Self {
            registry: ModeRegistry::builtin(),
            runner,
            mapper,
            working_dir,
            os: std::env::consts::OS.to_string(),
        }
    }

    /// Replace the mode registry
    pub fn with_registry(mut self, registry: ModeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Resolve as if running on another OS
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Resolve manual paths and modes into mapped requests
    pub async fn resolve(&self, input: &ResolveInput) -> VolcacheResult<Resolution> {
        let mut resolution = Resolution::default();

        self.resolve_manual(&input.paths, &mut resolution)?;

        let requested: BTreeSet<String> = input.modes.iter().cloned().collect();
        let ctx = ModeContext {
            runner: self.runner.as_ref(),
            requested: &requested,
            working_dir: &self.working_dir,
            os: &self.os,
        };

        let mut seen = BTreeSet::new();
        for mode in &input.modes {
            if !seen.insert(mode.as_str()) {
                debug!("Mode {} listed more than once, resolving it once", mode);
                continue;
            }

            match self.resolve_mode(mode, &ctx).await {
                Ok((requests, env)) => {
                    info!("Mode {}: {} cache path(s)", mode, requests.len());
                    resolution.requests.extend(requests);
                    resolution.env_overrides.extend(env);
                }
                Err(e) if !e.is_mode_local() => return Err(e),
                Err(e) => {
                    let reason = e.to_string();
                    warn!("Skipping cache mode {}: {}", mode, reason);
                    resolution.skipped.push(SkippedMode {
                        mode: mode.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(resolution)
    }

    async fn resolve_mode(
        &self,
        mode: &str,
        ctx: &ModeContext<'_>,
    ) -> VolcacheResult<(Vec<CachePathRequest>, Vec<(String, String)>)> {
        let resolver = self
            .registry
            .get(mode)
            .ok_or_else(|| VolcacheError::UnknownMode(mode.to_string()))?;

        debug!("Resolving mode {} via {}", mode, resolver.contract());
        let paths = resolver.resolve(ctx).await?;
        let requests = self.mapper.map_all(paths.requests)?;
        Ok((requests, paths.env))
    }

    fn resolve_manual(&self, paths: &[String], resolution: &mut Resolution) -> VolcacheResult<()> {
        let mut advised = false;

        for raw in paths {
            let path = raw.trim();
            if path.is_empty() {
                continue;
            }

            let target = self.absolutize(path);
            if !advised && is_risky(&target) {
                let advisory = format!(
                    "{}: caching a dependency directory directly is discouraged; \
                     prefer the package manager's mode (e.g. pnpm or yarn) which caches its store",
                    target
                );
                warn!("{}", advisory);
                resolution.advisories.push(advisory);
                advised = true;
            }

            let request = self.mapper.map(CachePathRequest::custom(target))?;
            resolution.requests.push(request);
        }

        Ok(())
    }

    /// Anchor workspace-relative manual paths at the working directory
    fn absolutize(&self, path: &str) -> String {
        if path.starts_with('~') || Path::new(path).is_absolute() {
            path.to_string()
        } else {
            self.working_dir.join(path).to_string_lossy().into_owned()
        }
    }
}

fn is_risky(target: &str) -> bool {
    let trimmed = target.trim_end_matches('/');
    RISKY_SUFFIXES.iter().any(|suffix| {
        Path::new(trimmed)
            .file_name()
            .is_some_and(|name| name == *suffix)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::modes::introspect::testing::ScriptedRunner;
    use crate::cache::modes::{ModePaths, ModeResolver};
    use async_trait::async_trait;
    use serial_test::serial;

    const GO_ENV: &str = r#"{"GOCACHE":"/root/.cache/go-build","GOMODCACHE":"/root/go/pkg/mod"}"#;

    fn resolver(runner: ScriptedRunner) -> CacheRequestResolver {
        CacheRequestResolver::new(
            PathMapper::new("/ns-cache", "/home/runner"),
            Arc::new(runner),
            PathBuf::from("/work/repo"),
        )
        .with_os("linux")
    }

    fn input(paths: &[&str], modes: &[&str]) -> ResolveInput {
        ResolveInput {
            paths: paths.iter().map(|s| s.to_string()).collect(),
            modes: modes.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn go_runner() -> ScriptedRunner {
        ScriptedRunner::new().on("go env -json GOCACHE GOMODCACHE", GO_ENV)
    }

    #[tokio::test]
    async fn go_scenario() {
        let res = resolver(go_runner())
            .resolve(&input(&[], &["go"]))
            .await
            .unwrap();

        assert_eq!(res.requests.len(), 2);
        assert_eq!(res.requests[0].mount_target, "/root/.cache/go-build");
        assert_eq!(res.requests[1].mount_target, "/root/go/pkg/mod");
        assert_eq!(
            res.requests[1].cache_path,
            PathBuf::from("/ns-cache/root/go/pkg/mod")
        );
        assert!(res.requests.iter().all(|r| r.framework == "go"));
        assert!(res.skipped.is_empty());
    }

    #[tokio::test]
    async fn manual_path_scenario() {
        let res = resolver(ScriptedRunner::new())
            .resolve(&input(&["/tmp/mydata"], &[]))
            .await
            .unwrap();

        assert_eq!(res.requests.len(), 1);
        assert_eq!(res.requests[0].framework, "custom");
        assert_eq!(res.requests[0].cache_path, PathBuf::from("/ns-cache/tmp/mydata"));
    }

    #[tokio::test]
    async fn manual_paths_come_before_modes() {
        let res = resolver(go_runner())
            .resolve(&input(&["/tmp/mydata"], &["go"]))
            .await
            .unwrap();
        let frameworks: Vec<_> = res.requests.iter().map(|r| r.framework.as_str()).collect();
        assert_eq!(frameworks, vec!["custom", "go", "go"]);
    }

    #[tokio::test]
    async fn unknown_mode_is_skipped() {
        let res = resolver(go_runner())
            .resolve(&input(&[], &["foobar", "go"]))
            .await
            .unwrap();

        assert_eq!(res.skipped.len(), 1);
        assert_eq!(res.skipped[0].mode, "foobar");
        assert_eq!(res.requests.len(), 2);
        assert!(res.requests.iter().all(|r| r.framework == "go"));
    }

    #[tokio::test]
    async fn failing_mode_does_not_affect_others() {
        let runner = go_runner().failing("python3 -m pip cache dir", 1, "No module named pip");
        let res = resolver(runner)
            .resolve(&input(&[], &["python", "go", "maven"]))
            .await
            .unwrap();

        assert_eq!(res.skipped.len(), 1);
        assert_eq!(res.skipped[0].mode, "python");
        let frameworks: Vec<_> = res.requests.iter().map(|r| r.framework.as_str()).collect();
        assert_eq!(frameworks, vec!["go", "go", "maven"]);
    }

    #[tokio::test]
    async fn relative_mode_output_fails_only_that_mode() {
        let runner = go_runner().on("brew --cache", "relative/dir\n");
        let res = resolver(runner)
            .resolve(&input(&[], &["brew", "go"]))
            .await
            .unwrap();
        assert_eq!(res.skipped[0].mode, "brew");
        assert_eq!(res.requests.len(), 2);
    }

    struct Homeless;

    #[async_trait]
    impl ModeResolver for Homeless {
        fn tag(&self) -> &'static str {
            "homeless"
        }

        fn contract(&self) -> &'static str {
            "always fails outside the mode"
        }

        async fn resolve(&self, _ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
            Err(VolcacheError::HomeDirUnknown)
        }
    }

    #[tokio::test]
    async fn errors_outside_the_mode_abort_resolution() {
        let mut registry = ModeRegistry::builtin();
        registry.register(Box::new(Homeless));

        let err = resolver(go_runner())
            .with_registry(registry)
            .resolve(&input(&[], &["go", "homeless"]))
            .await
            .unwrap_err();
        assert!(matches!(err, VolcacheError::HomeDirUnknown));
    }

    #[tokio::test]
    #[serial]
    async fn env_overrides_are_collected_not_applied() {
        let runner = ScriptedRunner::new().on("uv cache dir", "/home/runner/.cache/uv\n");
        let before = std::env::var("UV_LINK_MODE").ok();

        let res = resolver(runner)
            .resolve(&input(&[], &["uv"]))
            .await
            .unwrap();

        assert_eq!(
            res.env_overrides,
            vec![("UV_LINK_MODE".to_string(), "copy".to_string())]
        );
        assert_eq!(std::env::var("UV_LINK_MODE").ok(), before);
    }

    #[tokio::test]
    async fn risky_suffix_warns_once_and_is_kept() {
        let res = resolver(ScriptedRunner::new())
            .resolve(&input(&["/work/repo/node_modules", "pkg/node_modules/"], &[]))
            .await
            .unwrap();

        assert_eq!(res.advisories.len(), 1);
        assert_eq!(res.requests.len(), 2);
        assert_eq!(res.requests[1].mount_target, "/work/repo/pkg/node_modules");
    }

    #[tokio::test]
    async fn relative_manual_path_anchored_at_workspace() {
        let res = resolver(ScriptedRunner::new())
            .resolve(&input(&["build/cache", "~/.ccache", "  "], &[]))
            .await
            .unwrap();

        assert_eq!(res.requests.len(), 2);
        assert_eq!(res.requests[0].mount_target, "/work/repo/build/cache");
        assert_eq!(res.requests[1].mount_target, "~/.ccache");
        assert_eq!(
            res.requests[1].cache_path,
            PathBuf::from("/ns-cache/home/runner/.ccache")
        );
    }

    #[tokio::test]
    async fn duplicate_mode_resolved_once() {
        let runner = Arc::new(go_runner());
        let res = CacheRequestResolver::new(
            PathMapper::new("/ns-cache", "/home/runner"),
            runner.clone(),
            PathBuf::from("/work/repo"),
        )
        .resolve(&input(&[], &["go", "go"]))
        .await
        .unwrap();

        assert_eq!(res.requests.len(), 2);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn every_mode_alone_tags_its_framework() {
        let runner = ScriptedRunner::new()
            .on("go env -json GOCACHE GOMODCACHE", GO_ENV)
            .on("yarn --version", "1.22.0")
            .on("yarn cache dir", "/home/runner/.cache/yarn")
            .on("pnpm --version", "9.0.0")
            .on("pnpm store path", "/home/runner/.pnpm-store")
            .on("pnpm m ls --depth -1 --json", "[{\"path\":\"/work/repo\"}]")
            .on("npm config get cache", "/home/runner/.npm")
            .on("python3 -m pip cache dir", "/home/runner/.cache/pip")
            .on("composer config --global cache-dir", "/home/runner/.cache/composer")
            .on("poetry config cache-dir", "/home/runner/.cache/pypoetry")
            .on("uv cache dir", "/home/runner/.cache/uv")
            .on("brew --cache", "/home/runner/.cache/Homebrew")
            .on("deno info --json", "{\"denoDir\":\"/home/runner/.cache/deno\"}");
        let resolver = resolver(runner);

        for tag in ModeRegistry::builtin().tags() {
            let res = resolver.resolve(&input(&[], &[tag])).await.unwrap();
            assert!(res.skipped.is_empty(), "{} skipped: {:?}", tag, res.skipped);
            assert!(res.requests.iter().all(|r| r.framework == tag), "{}", tag);
        }
    }
}
