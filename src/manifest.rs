use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use serde_json::Value;

use crate::error::{CliError, Result};

const MANIFEST_FILE: &str = "package.json";

/// The project manifest (`package.json`).
///
/// Parsed as a JSON document rather than a rigid struct so a rewrite of the
/// version field leaves every other key intact. Output uses two-space
/// indentation, matching the file's conventional formatting.
pub struct Manifest {
    path: PathBuf,
    doc: Value,
}

impl Manifest {
    /// Loads `package.json` from a project directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(CliError::manifest(format!(
                "{} not found in {}",
                MANIFEST_FILE,
                dir.display()
            )));
        }
        let content = fs::read_to_string(&path)?;
        let doc: Value = serde_json::from_str(&content)?;
        Ok(Manifest { path, doc })
    }

    pub fn name(&self) -> Option<&str> {
        self.doc.get("name").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<Version> {
        self.doc
            .get("version")
            .and_then(Value::as_str)
            .and_then(|v| Version::parse(v).ok())
    }

    pub fn build_script(&self) -> Option<&str> {
        self.doc
            .get("scripts")
            .and_then(|s| s.get("build"))
            .and_then(Value::as_str)
    }

    /// Checks the fields the publish workflow depends on: name, a valid
    /// semver version, and a `scripts.build` entry. Fatal if any is missing.
    pub fn validate(&self) -> Result<()> {
        if self.name().map_or(true, str::is_empty) {
            return Err(CliError::manifest("missing 'name' field in package.json"));
        }
        if self.version().is_none() {
            return Err(CliError::manifest(
                "missing or invalid 'version' field in package.json",
            ));
        }
        if self.build_script().map_or(true, str::is_empty) {
            return Err(CliError::manifest(
                "missing 'scripts.build' command in package.json",
            ));
        }
        Ok(())
    }

    /// Rewrites only the version field and saves the manifest in place.
    pub fn set_version(&mut self, version: &Version) -> Result<()> {
        let obj = self
            .doc
            .as_object_mut()
            .ok_or_else(|| CliError::manifest("package.json root is not an object"))?;
        obj.insert("version".to_string(), Value::String(version.to_string()));
        self.save()
    }

    fn save(&self) -> Result<()> {
        // serde_json pretty printing uses two-space indentation.
        let mut out = serde_json::to_string_pretty(&self.doc)?;
        out.push('\n');
        fs::write(&self.path, out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(dir: &Path, body: &str) {
        fs::write(dir.join(MANIFEST_FILE), body).unwrap();
    }

    const FULL: &str = r#"{
  "name": "demo-app",
  "version": "1.0.0",
  "scripts": {
    "build": "npm run compile"
  }
}
"#;

    #[test]
    fn test_load_and_validate() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), FULL);

        let manifest = Manifest::load(dir.path()).unwrap();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.name(), Some("demo-app"));
        assert_eq!(manifest.version(), Some(Version::new(1, 0, 0)));
        assert_eq!(manifest.build_script(), Some("npm run compile"));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        assert!(Manifest::load(dir.path()).is_err());
    }

    #[test]
    fn test_validate_missing_build_script() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), r#"{"name": "demo", "version": "1.0.0"}"#);

        let manifest = Manifest::load(dir.path()).unwrap();
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("scripts.build"));
    }

    #[test]
    fn test_validate_invalid_version() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            r#"{"name": "demo", "version": "not-semver", "scripts": {"build": "x"}}"#,
        );

        let manifest = Manifest::load(dir.path()).unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_set_version_rewrites_only_version() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), FULL);

        let mut manifest = Manifest::load(dir.path()).unwrap();
        manifest.set_version(&Version::new(1, 3, 0)).unwrap();

        let written = fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(written.contains("\"version\": \"1.3.0\""));
        assert!(written.contains("\"build\": \"npm run compile\""));
        // Two-space indentation preserved
        assert!(written.contains("\n  \"name\""));

        let reloaded = Manifest::load(dir.path()).unwrap();
        assert_eq!(reloaded.version(), Some(Version::new(1, 3, 0)));
    }
}
