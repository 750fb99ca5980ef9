// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Java runtime selection for Minecraft releases.
//!
//! Each release line needs a specific Java major version to boot; resolving it
//! up front lets the right server image be pulled before the container exists.

use regex::Regex;
use std::sync::LazyLock;

/// Runtime used when the game version is absent or unparseable.
pub const DEFAULT_JAVA_RUNTIME: u32 = 17;

static RELEASE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?").expect("release pattern is a valid regex")
});

/// Resolve the Java major version required by `mc_version`.
///
/// | Release                 | Java |
/// |-------------------------|------|
/// | `2.x` and later         | 21   |
/// | `1.21+`, `1.20.5+`      | 21   |
/// | `1.18` – `1.20.4`       | 17   |
/// | `1.17` and earlier      | 8    |
/// | absent / unparseable    | 17   |
pub fn resolve_java_runtime(mc_version: Option<&str>) -> u32 {
    let Some(version) = mc_version else {
        return DEFAULT_JAVA_RUNTIME;
    };

    let Some(caps) = RELEASE_PATTERN.captures(version.trim()) else {
        return DEFAULT_JAVA_RUNTIME;
    };

    let parse = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());
    let (Some(major), Some(minor)) = (parse(1), parse(2)) else {
        return DEFAULT_JAVA_RUNTIME;
    };
    let patch = parse(3).unwrap_or(0);

    if major > 1 {
        return 21;
    }
    if minor >= 21 || (minor == 20 && patch >= 5) {
        return 21;
    }
    if minor >= 18 {
        return 17;
    }
    8
}

/// Image reference for a server container running Java `java_major`.
pub fn server_image(repository: &str, java_major: u32) -> String {
    format!("{}:java{}", repository, java_major)
}
