//! Local cache of template packages.
//!
//! Templates are published as npm packages; a versioned copy of each is kept
//! under `<config root>/template/<name>/<version>/`. Install downloads the
//! registry tarball and unpacks it; update installs the latest published
//! version when the cache is behind.

use std::fs;
use std::path::PathBuf;

use flate2::read::GzDecoder;
use semver::Version;
use serde_json::Value;
use tar::Archive;

use crate::error::{CliError, Result};

const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// One template package pinned to a version inside the local cache.
pub struct TemplatePackage {
    cache_root: PathBuf,
    name: String,
    version: String,
    registry: String,
}

impl TemplatePackage {
    pub fn new(cache_root: impl Into<PathBuf>, name: &str, version: &str) -> Self {
        TemplatePackage {
            cache_root: cache_root.into(),
            name: name.to_string(),
            version: version.to_string(),
            registry: DEFAULT_REGISTRY.to_string(),
        }
    }

    /// Overrides the registry endpoint. Used by tests and private mirrors.
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = registry.into();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Cache directory for this name/version pair.
    fn package_dir(&self) -> PathBuf {
        self.cache_root.join(&self.name).join(&self.version)
    }

    /// Directory holding the unpacked tarball payload (npm tarballs nest
    /// everything under a top-level `package/`).
    pub fn payload_dir(&self) -> PathBuf {
        self.package_dir().join("package")
    }

    /// The scaffold content inside the payload.
    pub fn template_dir(&self) -> PathBuf {
        self.payload_dir().join("template")
    }

    pub fn is_installed(&self) -> bool {
        self.payload_dir().is_dir()
    }

    /// Tarball filename uses the package name without any scope prefix.
    fn tarball_url(&self) -> String {
        let file = self.name.rsplit('/').next().unwrap_or(&self.name);
        format!(
            "{}/{}/-/{}-{}.tgz",
            self.registry, self.name, file, self.version
        )
    }

    /// Downloads and unpacks the pinned version into the cache.
    pub fn install(&self) -> Result<()> {
        let response = reqwest::blocking::get(self.tarball_url())?;
        if !response.status().is_success() {
            return Err(CliError::remote_state(format!(
                "template download failed for {}@{}: {}",
                self.name,
                self.version,
                response.status()
            )));
        }
        let bytes = response.bytes()?;

        let dir = self.package_dir();
        fs::create_dir_all(&dir)?;
        let decoder = GzDecoder::new(bytes.as_ref());
        let mut archive = Archive::new(decoder);
        archive.unpack(&dir)?;

        if !self.is_installed() {
            return Err(CliError::remote_state(format!(
                "template tarball for {}@{} had no package/ payload",
                self.name, self.version
            )));
        }
        Ok(())
    }

    /// Queries the registry for the latest published version.
    pub fn latest_version(&self) -> Result<Option<String>> {
        let response = reqwest::blocking::get(format!("{}/{}", self.registry, self.name))?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let doc: Value = response.json()?;
        Ok(doc
            .get("dist-tags")
            .and_then(|tags| tags.get("latest"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Re-pins to the latest published version and installs it if the cache
    /// does not have it yet.
    pub fn update(&mut self) -> Result<()> {
        let latest = match self.latest_version()? {
            Some(latest) => latest,
            None => return Ok(()),
        };

        let newer = match (Version::parse(&latest), Version::parse(&self.version)) {
            (Ok(l), Ok(c)) => l > c,
            _ => latest != self.version,
        };
        if newer {
            self.version = latest;
        }
        if !self.is_installed() {
            self.install()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tarball_url_plain_name() {
        let pkg = TemplatePackage::new("/tmp/cache", "cms-template-vue", "1.0.0");
        assert_eq!(
            pkg.tarball_url(),
            "https://registry.npmjs.org/cms-template-vue/-/cms-template-vue-1.0.0.tgz"
        );
    }

    #[test]
    fn test_tarball_url_scoped_name() {
        let pkg = TemplatePackage::new("/tmp/cache", "@simple.code/cms-template-vue", "2.1.0");
        assert_eq!(
            pkg.tarball_url(),
            "https://registry.npmjs.org/@simple.code/cms-template-vue/-/cms-template-vue-2.1.0.tgz"
        );
    }

    #[test]
    fn test_with_registry_overrides_endpoint() {
        let pkg = TemplatePackage::new("/tmp/cache", "cms-template-vue", "1.0.0")
            .with_registry("https://registry.npmmirror.com");
        assert_eq!(
            pkg.tarball_url(),
            "https://registry.npmmirror.com/cms-template-vue/-/cms-template-vue-1.0.0.tgz"
        );
    }

    #[test]
    fn test_cache_layout() {
        let dir = TempDir::new().unwrap();
        let pkg = TemplatePackage::new(dir.path(), "demo-template", "1.2.3");
        assert!(!pkg.is_installed());

        // Simulate an unpacked tarball.
        fs::create_dir_all(pkg.template_dir()).unwrap();
        assert!(pkg.is_installed());
        assert!(pkg
            .template_dir()
            .ends_with("demo-template/1.2.3/package/template"));
    }
}
