//! Mode detection from project marker files
//!
//! Scans the workspace root for files that identify a build ecosystem and
//! returns the matching mode tags in catalog order.

use std::path::Path;
use tracing::debug;

/// Marker files per mode tag, in catalog order
const MARKERS: &[(&str, &[&str])] = &[
    ("go", &["go.mod", "go.work"]),
    ("yarn", &["yarn.lock"]),
    ("pnpm", &["pnpm-lock.yaml"]),
    ("npm", &["package-lock.json", "npm-shrinkwrap.json"]),
    ("python", &["requirements.txt"]),
    ("rust", &["Cargo.toml"]),
    ("gradle", &["gradlew", "build.gradle", "build.gradle.kts"]),
    ("maven", &["pom.xml"]),
    ("composer", &["composer.json"]),
    ("poetry", &["poetry.lock"]),
    ("uv", &["uv.lock"]),
    ("ruby", &["Gemfile"]),
    ("brew", &["Brewfile"]),
    ("cocoapods", &["Podfile"]),
    ("deno", &["deno.json", "deno.jsonc"]),
    ("swiftpm", &["Package.swift"]),
];

/// Detect the modes that apply to a project directory
pub fn detect_modes(project_dir: &Path) -> Vec<&'static str> {
    let mut modes = Vec::new();

    for (mode, patterns) in MARKERS {
        if let Some(found) = patterns
            .iter()
            .map(|p| project_dir.join(p))
            .find(|p| p.is_file())
        {
            debug!("Detected {} from {}", mode, found.display());
            modes.push(*mode);
        }
    }

    debug!("Detected {} modes", modes.len());
    modes
}
