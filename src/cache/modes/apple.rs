//! Xcode and Swift Package Manager modes

use super::{ModeContext, ModePaths, ModeResolver};
use crate::error::VolcacheResult;
use async_trait::async_trait;

/// Shared SwiftPM download cache, used by both `swiftpm` and `xcode`
pub const SWIFTPM_CACHE: &str = "~/Library/Caches/org.swift.swiftpm";

const DERIVED_DATA: &str = "~/Library/Developer/Xcode/DerivedData";

/// Xcode build products, plus the SwiftPM cache unless the `swiftpm` mode
/// already contributes it.
pub struct Xcode;

#[async_trait]
impl ModeResolver for Xcode {
    fn tag(&self) -> &'static str {
        "xcode"
    }

    fn contract(&self) -> &'static str {
        "static DerivedData and SwiftPM cache"
    }

    async fn resolve(&self, ctx: &ModeContext<'_>) -> VolcacheResult<ModePaths> {
        let mut paths = ModePaths::default();
        paths.push(DERIVED_DATA, self.tag());
        if !ctx.has_mode("swiftpm") {
            paths.push(SWIFTPM_CACHE, self.tag());
        }
        Ok(paths)
    }
}
