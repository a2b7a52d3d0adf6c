//! JavaScript ecosystem modes

use super::introspect::{
    parse_documents, parse_object, parse_plain, parse_version, stdout_of, WarningFilter,
};
use super::{ModeContext, ModePaths, ModeResolver};
use crate::cache::request::CachePathRequest;
use crate::error::{VolcacheError, VolcacheResult};
use async_trait::async_trait;
use semver::Version;
use serde_json::Value;
use tracing::debug;

/// Yarn classic prints `warning ...` lines on stdout
const YARN_WARNINGS: WarningFilter = WarningFilter::new("warning", Version::new(2, 0, 0));

/// pnpm before 9 prints ` WARN ` lines on stdout
const PNPM_WARNINGS: WarningFilter = WarningFilter::new("WARN", Version::new(9, 0, 0));

async fn tool_version(ctx: &ModeContext<'_>, program: &str) -> Option<Version> {
    match stdout_of(ctx.runner, program, &["--version"]).await {
        Ok(out) => parse_version(&out),
        Err(e) => {
            debug!("Could not determine {} version: {}", program, e);
            None
        }
    }
}

pub struct Yarn;

#[async_trait]
impl ModeResolver for Yarn {
    fn tag(&self) -> &'static str {
        "yarn"
    }

    fn contract(&self) -> &'static str {
        "yarn cache dir (v1) or yarn config get cacheFolder (v2+), plain"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        let version = tool_version(ctx, "yarn").await;
        let classic = version.as_ref().map_or(true, |v| v.major < 2);

        let args: &[&str] = if classic {
            &["cache", "dir"]
        } else {
            &["config", "get", "cacheFolder"]
        };
        let stdout = stdout_of(ctx.runner, "yarn", args).await?;
        let cleaned = YARN_WARNINGS.apply(&stdout, version.as_ref());

        let mut paths = ModePaths::default();
        paths.push(parse_plain(&cleaned)?, self.tag());
        Ok(paths)
    }
}

/// pnpm content store plus every workspace project's `node_modules`.
///
/// `node_modules` lives in the workspace and must not outlive the job, so
/// those requests are wiped. pnpm hardlinks from the store by default, which
/// fails across the volume boundary; the import method is switched to
/// clone-or-copy.
pub struct Pnpm;

/// Extract project directories from `pnpm m ls --json` documents
fn project_paths(documents: &[Value]) -> Vec<String> {
    let mut out = Vec::new();
    for doc in documents {
        let entries: Vec<&Value> = match doc {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for entry in entries {
            if let Some(path) = entry.get("path").and_then(Value::as_str) {
                out.push(path.to_string());
            }
        }
    }
    out
}

#[async_trait]
impl ModeResolver for Pnpm {
    fn tag(&self) -> &'static str {
        "pnpm"
    }

    fn contract(&self) -> &'static str {
        "pnpm store path (plain); pnpm m ls --depth -1 --json (one JSON document per line)"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        let version = tool_version(ctx, "pnpm").await;

        let store = stdout_of(ctx.runner, "pnpm", &["store", "path"]).await?;
        let store = parse_plain(&PNPM_WARNINGS.apply(&store, version.as_ref()))?;

        let listing = stdout_of(ctx.runner, "pnpm", &["m", "ls", "--depth", "-1", "--json"]).await?;
        let documents = parse_documents(&PNPM_WARNINGS.apply(&listing, version.as_ref()))?;

        let mut paths = ModePaths::default();
        paths.push(store, self.tag());
        for project in project_paths(&documents) {
            let target = format!("{}/node_modules", project.trim_end_matches('/'));
            paths
                .requests
                .push(CachePathRequest::new(target, self.tag()).wiped());
        }
        paths.set_env("npm_config_package_import_method", "clone-or-copy");
        Ok(paths)
    }
}

pub struct Npm;

#[async_trait]
impl ModeResolver for Npm {
    fn tag(&self) -> &'static str {
        "npm"
    }

    fn contract(&self) -> &'static str {
        "npm config get cache (plain)"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        let stdout = stdout_of(ctx.runner, "npm", &["config", "get", "cache"]).await?;
        let mut paths = ModePaths::default();
        paths.push(parse_plain(&stdout)?, self.tag());
        Ok(paths)
    }
}

pub struct Deno;

#[async_trait]
impl ModeResolver for Deno {
    fn tag(&self) -> &'static str {
        "deno"
    }

    fn contract(&self) -> &'static str {
        "deno info --json (JSON object, denoDir)"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        let stdout = stdout_of(ctx.runner, "deno", &["info", "--json"]).await?;
        let info = parse_object(&stdout)?;
        let dir = info
            .get("denoDir")
            .and_then(Value::as_str)
            .ok_or_else(|| VolcacheError::introspection("deno info --json", "denoDir missing"))?;

        let mut paths = ModePaths::default();
        paths.push(dir, self.tag());
        Ok(paths)
    }
}

/// Playwright browser downloads
pub struct Playwright;

#[async_trait]
impl ModeResolver for Playwright {
    fn tag(&self) -> &'static str {
        "playwright"
    }

    fn contract(&self) -> &'static str {
        "static per-OS browser directory"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        let target = if ctx.os == "macos" {
            "~/Library/Caches/ms-playwright"
        } else {
            "~/.cache/ms-playwright"
        };
        let mut paths = ModePaths::default();
        paths.push(target, self.tag());
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::modes::introspect::testing::ScriptedRunner;
    use crate::cache::modes::tests::resolve_with;

    fn pnpm_runner(version: &str, listing: &str) -> ScriptedRunner {
        ScriptedRunner::new()
            .on("pnpm --version", version)
            .on("pnpm store path", "/home/u/.local/share/pnpm/store/v3\n")
            .on("pnpm m ls --depth -1 --json", listing)
    }

    #[tokio::test]
    async fn pnpm_multi_document_listing() {
        let runner = pnpm_runner("9.1.0\n", "{\"path\":\"/a\"}\n{\"path\":\"/b\"}\n");
        let paths = resolve_with("pnpm", &runner, &["pnpm"], "linux").await.unwrap();

        let wiped: Vec<_> = paths.requests.iter().filter(|r| r.wipe).collect();
        assert_eq!(wiped.len(), 2);
        assert_eq!(wiped[0].mount_target, "/a/node_modules");
        assert_eq!(wiped[1].mount_target, "/b/node_modules");

        assert_eq!(paths.requests[0].mount_target, "/home/u/.local/share/pnpm/store/v3");
        assert!(!paths.requests[0].wipe);
        assert!(paths.requests.iter().all(|r| r.framework == "pnpm"));
        assert_eq!(
            paths.env,
            vec![(
                "npm_config_package_import_method".to_string(),
                "clone-or-copy".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn pnpm_array_documents() {
        let runner = pnpm_runner("9.0.0", "[{\"path\":\"/repo\"},{\"path\":\"/repo/pkg/x/\"}]\n");
        let paths = resolve_with("pnpm", &runner, &["pnpm"], "linux").await.unwrap();
        let targets: Vec<_> = paths.requests.iter().map(|r| r.mount_target.as_str()).collect();
        assert!(targets.contains(&"/repo/node_modules"));
        assert!(targets.contains(&"/repo/pkg/x/node_modules"));
    }

    #[tokio::test]
    async fn pnpm_pretty_printed_listing() {
        let listing = "[\n  {\n    \"name\": \"root\",\n    \"path\": \"/a\"\n  },\n  {\n    \"name\": \"web\",\n    \"path\": \"/a/web\"\n  }\n]\n";
        let paths = resolve_with("pnpm", &pnpm_runner("9.4.0", listing), &["pnpm"], "linux")
            .await
            .unwrap();
        let wiped: Vec<_> = paths
            .requests
            .iter()
            .filter(|r| r.wipe)
            .map(|r| r.mount_target.as_str())
            .collect();
        assert_eq!(wiped, vec!["/a/node_modules", "/a/web/node_modules"]);
    }

    #[tokio::test]
    async fn pnpm_old_version_with_warnings() {
        let noisy = " WARN  Unsupported engine\n WARN  another\n{\"path\":\"/a\"}\n";
        let clean = "{\"path\":\"/a\"}\n";

        for version in ["8.6.0", "9.2.0"] {
            let with_warnings = resolve_with("pnpm", &pnpm_runner(version, noisy), &["pnpm"], "linux")
                .await
                .unwrap();
            let without = resolve_with("pnpm", &pnpm_runner(version, clean), &["pnpm"], "linux")
                .await
                .unwrap();
            assert_eq!(with_warnings, without);
        }
    }

    #[tokio::test]
    async fn pnpm_bad_listing_fails_mode() {
        let runner = pnpm_runner("9.0.0", "not json\n");
        let err = resolve_with("pnpm", &runner, &["pnpm"], "linux").await.unwrap_err();
        assert!(err.is_mode_local());
    }

    #[tokio::test]
    async fn yarn_classic_uses_cache_dir() {
        let runner = ScriptedRunner::new()
            .on("yarn --version", "1.22.19\n")
            .on("yarn cache dir", "warning Skipping preferred cache folder\n/home/u/.cache/yarn/v6\n");
        let paths = resolve_with("yarn", &runner, &["yarn"], "linux").await.unwrap();
        assert_eq!(paths.requests[0].mount_target, "/home/u/.cache/yarn/v6");
        assert_eq!(paths.requests[0].framework, "yarn");
    }

    #[tokio::test]
    async fn yarn_berry_uses_config() {
        let runner = ScriptedRunner::new()
            .on("yarn --version", "4.1.0\n")
            .on("yarn config get cacheFolder", "/home/u/.yarn/berry/cache\n");
        let paths = resolve_with("yarn", &runner, &["yarn"], "linux").await.unwrap();
        assert_eq!(paths.requests[0].mount_target, "/home/u/.yarn/berry/cache");
        assert!(runner.calls().iter().all(|c| c != "yarn cache dir"));
    }

    #[tokio::test]
    async fn deno_dir_from_info() {
        let runner = ScriptedRunner::new().on(
            "deno info --json",
            "{\n  \"denoDir\": \"/home/u/.cache/deno\",\n  \"modulesCache\": \"x\"\n}\n",
        );
        let paths = resolve_with("deno", &runner, &["deno"], "linux").await.unwrap();
        assert_eq!(paths.requests[0].mount_target, "/home/u/.cache/deno");
    }

    #[tokio::test]
    async fn playwright_depends_on_os() {
        let runner = ScriptedRunner::new();
        let linux = resolve_with("playwright", &runner, &["playwright"], "linux").await.unwrap();
        let mac = resolve_with("playwright", &runner, &["playwright"], "macos").await.unwrap();
        assert_eq!(linux.requests[0].mount_target, "~/.cache/ms-playwright");
        assert_eq!(mac.requests[0].mount_target, "~/Library/Caches/ms-playwright");
    }

    #[test]
    fn project_paths_skip_entries_without_path() {
        let docs = vec![
            serde_json::json!({"name": "root"}),
            serde_json::json!([{"path": "/x"}, {"name": "y"}]),
        ];
        assert_eq!(project_paths(&docs), vec!["/x".to_string()]);
    }
}
