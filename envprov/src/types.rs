// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::fmt;

use serde::Serialize;

const OPERATOR_CHARS: &[char] = &['=', '<', '>', '!', '~'];

/// The runtime an environment is created with, taken from the first entry of
/// its dependency list (for instance `python=3.10`).
#[derive(Serialize, Clone, Eq, Debug, Hash, PartialEq)]
pub struct RuntimeSpec {
    specifier: String,
    package: String,
    version: Option<String>,
}

impl RuntimeSpec {
    pub fn new<S: Into<String>>(specifier: S) -> RuntimeSpec {
        let specifier = specifier.into();
        let trimmed = specifier.trim();
        let (package, rest) =
            match trimmed.find(|c: char| OPERATOR_CHARS.contains(&c) || c.is_whitespace()) {
                Some(idx) => trimmed.split_at(idx),
                None => (trimmed, ""),
            };

        // A bare `=` or `==` just pins the version, anything else is a
        // constraint and stays attached to the token.
        let rest = rest.trim();
        let version = rest
            .strip_prefix("==")
            .or_else(|| rest.strip_prefix('='))
            .unwrap_or(rest)
            .trim();

        RuntimeSpec {
            package: package.to_string(),
            version: if version.is_empty() {
                None
            } else {
                Some(version.to_string())
            },
            specifier,
        }
    }

    /// The entry exactly as written in the environment file.
    pub fn specifier(&self) -> &str {
        self.specifier.as_str()
    }

    pub fn package(&self) -> &str {
        self.package.as_str()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl fmt::Display for RuntimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} {}", self.package, version),
            None => write!(f, "{}", self.package),
        }
    }
}
