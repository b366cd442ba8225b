// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vfs::VfsPath;

use crate::errors::SpecError;
use crate::types::RuntimeSpec;

pub const SPEC_FILENAME: &str = "environment.yml";

/// A named environment and the ordered list of package specifiers that
/// should end up in it.
///
/// The first dependency is the runtime the environment is created with, the
/// rest are installed into it one at a time.
#[derive(Serialize, Deserialize, Clone, Eq, Debug, PartialEq)]
pub struct EnvironmentSpec {
    name: String,
    #[serde(default)]
    channels: Vec<String>,
    dependencies: Vec<String>,
}

impl EnvironmentSpec {
    pub fn load(file: &VfsPath) -> Result<EnvironmentSpec, SpecError> {
        let path = file.as_str().to_string();
        let is_file = file.is_file().map_err(|source| SpecError::Unreadable {
            path: path.clone(),
            source,
        })?;
        if !is_file {
            return Err(SpecError::NotFound { path });
        }

        let reader = file
            .open_file()
            .map_err(|source| SpecError::Unreadable { path, source })?;

        EnvironmentSpec::from_reader(reader)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<EnvironmentSpec, SpecError> {
        let spec: EnvironmentSpec =
            serde_yaml::from_reader(reader).map_err(|source| SpecError::Invalid { source })?;
        spec.validated()
    }

    fn validated(self) -> Result<EnvironmentSpec, SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::EmptyName);
        }

        Ok(self)
    }
}

impl EnvironmentSpec {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn runtime(&self) -> Option<RuntimeSpec> {
        self.dependencies.first().map(RuntimeSpec::new)
    }

    /// Everything after the runtime entry, in file order.
    pub fn packages(&self) -> &[String] {
        self.dependencies.get(1..).unwrap_or(&[])
    }
}

impl FromStr for EnvironmentSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec: EnvironmentSpec =
            serde_yaml::from_str(s).map_err(|source| SpecError::Invalid { source })?;
        spec.validated()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use vfs::{MemoryFS, VfsPath};

    use super::{EnvironmentSpec, SPEC_FILENAME};
    use crate::errors::SpecError;

    fn memory_file(contents: &str) -> VfsPath {
        let root: VfsPath = MemoryFS::new().into();
        let file = root.join(SPEC_FILENAME).unwrap();
        file.create_file()
            .unwrap()
            .write_all(contents.as_bytes())
            .unwrap();
        file
    }

    #[test]
    fn loads_name_and_dependencies() {
        let file = memory_file(
            "name: envA\n\
             dependencies:\n  - python=3.10\n  - numpy\n  - requests\n",
        );
        let spec = EnvironmentSpec::load(&file).unwrap();

        assert_eq!(spec.name(), "envA");
        assert_eq!(spec.dependencies(), ["python=3.10", "numpy", "requests"]);
        assert_eq!(spec.packages(), ["numpy", "requests"]);
        assert!(spec.channels().is_empty());
        assert_eq!(spec.runtime().unwrap().version(), Some("3.10"));
    }

    #[test]
    fn loads_channels_and_ignores_unknown_keys() {
        let spec: EnvironmentSpec = "name: envC\n\
             prefix: /opt/envs/envC\n\
             channels:\n  - conda-forge\n  - defaults\n\
             dependencies:\n  - python=3.11\n"
            .parse()
            .unwrap();

        assert_eq!(spec.channels(), ["conda-forge", "defaults"]);
        assert!(spec.packages().is_empty());
    }

    #[test]
    fn empty_dependencies() {
        let spec: EnvironmentSpec = "name: bare\ndependencies: []\n".parse().unwrap();

        assert!(spec.runtime().is_none());
        assert!(spec.packages().is_empty());
    }

    #[test]
    fn missing_name() {
        let file = memory_file("dependencies:\n  - python=3.10\n");
        let err = EnvironmentSpec::load(&file).unwrap_err();

        assert!(matches!(err, SpecError::Invalid { .. }));
    }

    #[test]
    fn missing_dependencies() {
        let err = "name: envA\n".parse::<EnvironmentSpec>().unwrap_err();
        assert!(matches!(err, SpecError::Invalid { .. }));
    }

    #[test]
    fn empty_name() {
        let err = "name: '  '\ndependencies: []\n"
            .parse::<EnvironmentSpec>()
            .unwrap_err();
        assert!(matches!(err, SpecError::EmptyName));
    }

    #[test]
    fn nested_pip_section_is_rejected() {
        let err = "name: envA\n\
             dependencies:\n  - python=3.10\n  - pip:\n    - requests\n"
            .parse::<EnvironmentSpec>()
            .unwrap_err();
        assert!(matches!(err, SpecError::Invalid { .. }));
    }

    #[test]
    fn not_a_mapping() {
        let err = "- python=3.10\n- numpy\n"
            .parse::<EnvironmentSpec>()
            .unwrap_err();
        assert!(matches!(err, SpecError::Invalid { .. }));
    }

    #[test]
    fn missing_file() {
        let root: VfsPath = MemoryFS::new().into();
        let file = root.join(SPEC_FILENAME).unwrap();
        let err = EnvironmentSpec::load(&file).unwrap_err();

        assert!(matches!(err, SpecError::NotFound { .. }));
    }
}
