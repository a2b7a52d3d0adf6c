//! Language toolchain modes that ask the tool where its cache lives

use super::introspect::{parse_object, parse_plain, stdout_of};
use super::{ModeContext, ModePaths, ModeResolver};
use crate::error::{VolcacheError, VolcacheResult};
use async_trait::async_trait;

/// Resolve a mode whose command prints a single directory
async fn single_dir(
    ctx: &ModeContext<'_>,
    tag: &str,
    program: &str,
    args: &[&str],
) -> VolcacheResult<ModePaths> {
    let stdout = stdout_of(ctx.runner, program, args).await?;
    let mut paths = ModePaths::default();
    paths.push(parse_plain(&stdout)?, tag);
    Ok(paths)
}

/// Go build and module caches
pub struct Go;

#[async_trait]
impl ModeResolver for Go {
    fn tag(&self) -> &'static str {
        "go"
    }

    fn contract(&self) -> &'static str {
        "go env -json GOCACHE GOMODCACHE (JSON object)"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        let stdout = stdout_of(ctx.runner, "go", &["env", "-json", "GOCACHE", "GOMODCACHE"]).await?;
        let env = parse_object(&stdout)?;

        let mut paths = ModePaths::default();
        for key in ["GOCACHE", "GOMODCACHE"] {
            let dir = env
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    VolcacheError::introspection("go env", format!("{} not reported", key))
                })?;
            paths.push(dir, self.tag());
        }
        Ok(paths)
    }
}

/// pip's HTTP and wheel cache
pub struct Python;

#[async_trait]
impl ModeResolver for Python {
    fn tag(&self) -> &'static str {
        "python"
    }

    fn contract(&self) -> &'static str {
        "python3 -m pip cache dir (plain)"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        single_dir(ctx, self.tag(), "python3", &["-m", "pip", "cache", "dir"]).await
    }
}

pub struct Poetry;

#[async_trait]
impl ModeResolver for Poetry {
    fn tag(&self) -> &'static str {
        "poetry"
    }

    fn contract(&self) -> &'static str {
        "poetry config cache-dir (plain)"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        single_dir(ctx, self.tag(), "poetry", &["config", "cache-dir"]).await
    }
}

/// uv's cache; uv hardlinks from its cache by default, which breaks across
/// the volume boundary, so it is switched to copying.
pub struct Uv;

#[async_trait]
impl ModeResolver for Uv {
    fn tag(&self) -> &'static str {
        "uv"
    }

    fn contract(&self) -> &'static str {
        "uv cache dir (plain)"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        let mut paths = single_dir(ctx, self.tag(), "uv", &["cache", "dir"]).await?;
        paths.set_env("UV_LINK_MODE", "copy");
        Ok(paths)
    }
}

pub struct Composer;

#[async_trait]
impl ModeResolver for Composer {
    fn tag(&self) -> &'static str {
        "composer"
    }

    fn contract(&self) -> &'static str {
        "composer config --global cache-dir (plain)"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        single_dir(ctx, self.tag(), "composer", &["config", "--global", "cache-dir"]).await
    }
}

/// Homebrew download cache
pub struct Brew;

#[async_trait]
impl ModeResolver for Brew {
    fn tag(&self) -> &'static str {
        "brew"
    }

    fn contract(&self) -> &'static str {
        "brew --cache (plain)"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        single_dir(ctx, self.tag(), "brew", &["--cache"]).await
    }
}
