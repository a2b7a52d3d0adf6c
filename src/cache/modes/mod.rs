//! Per-ecosystem cache path resolution
//!
//! Every mode tag maps to a [`ModeResolver`] with its own command contract.
//! The registry keeps catalog order, which is also the order detected modes
//! are reported in. Adding an ecosystem means adding a resolver here; the
//! orchestration in [`resolver`](super::resolver) does not change.

pub mod apple;
pub mod introspect;
pub mod node;
pub mod toolchains;

use crate::cache::request::CachePathRequest;
use crate::error::VolcacheResult;
use async_trait::async_trait;
use introspect::CommandRunner;
use std::collections::BTreeSet;
use std::path::Path;

/// Everything a mode may look at while resolving
pub struct ModeContext<'a> {
    /// Runs the mode's introspection command
    pub runner: &'a dyn CommandRunner,
    /// All mode tags requested for this run
    pub requested: &'a BTreeSet<String>,
    /// Absolute workspace directory for workspace-scoped paths
    pub working_dir: &'a Path,
    /// Target OS name (`std::env::consts::OS` outside tests)
    pub os: &'a str,
}

impl ModeContext<'_> {
    /// Whether another mode was requested alongside this one
    pub fn has_mode(&self, tag: &str) -> bool {
        self.requested.contains(tag)
    }

    /// Resolve a workspace-relative path (`./target`) against the working dir
    pub fn workspace_path(&self, relative: &str) -> String {
        let rest = relative.trim_start_matches("./");
        self.working_dir.join(rest).to_string_lossy().into_owned()
    }

    /// Expand a static target: `./x` is workspace-scoped, anything else verbatim
    pub fn static_target(&self, target: &str) -> String {
        if target.starts_with("./") {
            self.workspace_path(target)
        } else {
            target.to_string()
        }
    }
}

/// Requests and environment overrides produced by one mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModePaths {
    pub requests: Vec<CachePathRequest>,
    /// Process-wide variables the orchestrator applies before attachment
    pub env: Vec<(String, String)>,
}

impl ModePaths {
    /// Add a request for `target` under the given framework tag
    pub fn push(&mut self, target: impl Into<String>, framework: &str) {
        self.requests.push(CachePathRequest::new(target, framework));
    }

    /// Add an environment override
    pub fn set_env(&mut self, key: &str, value: &str) {
        self.env.push((key.to_string(), value.to_string()));
    }
}

/// Resolves the cache paths for one mode tag
#[async_trait]
pub trait ModeResolver: Send + Sync {
    /// Mode tag this resolver answers to
    fn tag(&self) -> &'static str;

    /// Human-readable description of the command contract
    fn contract(&self) -> &'static str;

    /// Resolve the mode's cache paths
    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths>;
}

/// A mode whose paths are fixed and need no introspection
pub struct StaticMode {
    tag: &'static str,
    targets: &'static [&'static str],
    env: &'static [(&'static str, &'static str)],
}

impl StaticMode {
    pub const fn new(tag: &'static str, targets: &'static [&'static str]) -> Self {
        Self {
            tag,
            targets,
            env: &[],
        }
    }

    pub fn with_env(mut self, env: &'static [(&'static str, &'static str)]) -> Self {
        self.env = env;
        self
    }
}

#[async_trait]
impl ModeResolver for StaticMode {
    fn tag(&self) -> &'static str {
        self.tag
    }

    fn contract(&self) -> &'static str {
        "static paths"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        let mut paths = ModePaths::default();
        for target in self.targets {
            paths.push(ctx.static_target(target), self.tag);
        }
        for (key, value) in self.env {
            paths.set_env(key, value);
        }
        Ok(paths)
    }
}

/// Lookup table from mode tag to resolver
pub struct ModeRegistry {
    modes: Vec<Box<dyn ModeResolver>>,
}

impl ModeRegistry {
    /// An empty registry
    pub fn empty() -> Self {
        Self { modes: Vec::new() }
    }

    /// The built-in catalog
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(toolchains::Go));
        registry.register(Box::new(node::Yarn));
        registry.register(Box::new(node::Pnpm));
        registry.register(Box::new(node::Npm));
        registry.register(Box::new(toolchains::Python));
        registry.register(Box::new(StaticMode::new(
            "rust",
            &["~/.cargo/registry", "~/.cargo/git", "./target"],
        )));
        registry.register(Box::new(StaticMode::new(
            "gradle",
            &["~/.gradle/caches", "~/.gradle/wrapper"],
        )));
        registry.register(Box::new(StaticMode::new("maven", &["~/.m2/repository"])));
        registry.register(Box::new(toolchains::Composer));
        registry.register(Box::new(toolchains::Poetry));
        registry.register(Box::new(toolchains::Uv));
        registry.register(Box::new(
            StaticMode::new("ruby", &["./vendor/bundle"])
                .with_env(&[("BUNDLE_PATH", "vendor/bundle")]),
        ));
        registry.register(Box::new(toolchains::Brew));
        registry.register(Box::new(StaticMode::new(
            "cocoapods",
            &["~/Library/Caches/CocoaPods", "./Pods"],
        )));
        registry.register(Box::new(StaticMode::new(
            "apt",
            &["/var/cache/apt/archives", "/var/lib/apt/lists"],
        )));
        registry.register(Box::new(node::Deno));
        registry.register(Box::new(node::Playwright));
        registry.register(Box::new(StaticMode::new(
            "swiftpm",
            &["./.build", apple::SWIFTPM_CACHE],
        )));
        registry.register(Box::new(apple::Xcode));
        registry.register(Box::new(StaticMode::new(
            crate::cache::request::CUSTOM_FRAMEWORK,
            &[],
        )));
        registry
    }

    /// Add a resolver, replacing any existing one with the same tag
    pub fn register(&mut self, mode: Box<dyn ModeResolver>) {
        if let Some(slot) = self.modes.iter_mut().find(|m| m.tag() == mode.tag()) {
            *slot = mode;
        } else {
            self.modes.push(mode);
        }
    }

    /// Find the resolver for a tag
    pub fn get(&self, tag: &str) -> Option<&dyn ModeResolver> {
        self.modes
            .iter()
            .find(|m| m.tag() == tag)
            .map(|m| m.as_ref())
    }

    /// All registered tags in catalog order
    pub fn tags(&self) -> Vec<&'static str> {
        self.modes.iter().map(|m| m.tag()).collect()
    }
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
