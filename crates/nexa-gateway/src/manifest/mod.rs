//! Model manifest and version resolution.
//!
//! The manifest maps family → version → artifact filename and is persisted
//! as pretty JSON next to the artifacts.  [`ModelVersionManager`] owns the
//! current manifest as an immutable `Arc` snapshot: readers clone the `Arc`
//! and never see a partially rebuilt manifest, because a refresh builds a new
//! snapshot off to the side and swaps it in under a short write lock.

mod version;

pub use version::{compare_versions, sort_versions};

use nexa_kernel::GatewayError;
use nexa_kernel::gateway::ModelFamily;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// File extensions recognised as model artifacts during a directory scan.
pub const ARTIFACT_EXTENSIONS: [&str; 6] = ["pt", "pth", "onnx", "safetensors", "bin", "ckpt"];

/// Separator between family and version in artifact filenames.
const FAMILY_VERSION_DELIMITER: char = '_';

/// Manifest keys use canonical family names where the family is known.
fn canonical_family(name: &str) -> String {
    ModelFamily::from_name(name)
        .map(|f| f.name().to_string())
        .unwrap_or_else(|| name.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifest
// ─────────────────────────────────────────────────────────────────────────────

/// Family → version → artifact filename (relative to the model directory).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    families: BTreeMap<String, BTreeMap<String, String>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.  Existing entries are never overwritten.
    pub fn insert(
        &mut self,
        family: &str,
        version: impl Into<String>,
        artifact: impl Into<String>,
    ) -> bool {
        let versions = self.families.entry(canonical_family(family)).or_default();
        let version = version.into();
        if versions.contains_key(&version) {
            return false;
        }
        versions.insert(version, artifact.into());
        true
    }

    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }

    pub fn versions(&self, family: &str) -> Option<&BTreeMap<String, String>> {
        self.families.get(&canonical_family(family))
    }

    /// Every `(family, version, artifact)` triple.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.families.iter().flat_map(|(family, versions)| {
            versions
                .iter()
                .map(move |(v, a)| (family.as_str(), v.as_str(), a.as_str()))
        })
    }

    /// Number of (family, version) entries.
    pub fn len(&self) -> usize {
        self.families.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A manifest entry resolved for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub family: String,
    pub version: String,
    pub artifact: PathBuf,
}

impl ResolvedModel {
    /// `<family>_<version>`, the `model` field of responses.
    pub fn model_id(&self) -> String {
        format!("{}_{}", self.family, self.version)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ModelVersionManager
// ─────────────────────────────────────────────────────────────────────────────

/// Loads, persists, and resolves against the model manifest.
pub struct ModelVersionManager {
    model_dir: PathBuf,
    manifest_path: PathBuf,
    current: RwLock<Arc<Manifest>>,
}

impl ModelVersionManager {
    /// Create a manager with an empty manifest.  Call [`load`](Self::load)
    /// before serving.
    pub fn new(model_dir: impl Into<PathBuf>, manifest_file: impl AsRef<Path>) -> Self {
        let model_dir = model_dir.into();
        let manifest_path = model_dir.join(manifest_file);
        Self {
            model_dir,
            manifest_path,
            current: RwLock::new(Arc::new(Manifest::new())),
        }
    }

    /// Create a manager and load the manifest immediately.
    pub fn open(model_dir: impl Into<PathBuf>, manifest_file: impl AsRef<Path>) -> Self {
        let manager = Self::new(model_dir, manifest_file);
        manager.load();
        manager
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Current immutable snapshot.
    pub fn snapshot(&self) -> Arc<Manifest> {
        self.current.read().clone()
    }

    /// Load the persisted manifest, falling back to a directory scan when it
    /// is missing, unparseable, or lists no existing artifacts.  A scan that
    /// finds artifacts is written back as the new persisted manifest.
    ///
    /// Never fails: when neither source yields entries the error is logged
    /// and the gateway starts with zero models.
    pub fn load(&self) -> Arc<Manifest> {
        let manifest = match self.build() {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, dir = %self.model_dir.display(), "starting with an empty model manifest");
                Manifest::new()
            }
        };
        self.install(manifest)
    }

    /// Reload the manifest and append any artifacts found on disk that it
    /// does not list yet.  Existing entries are never rewritten.
    pub fn refresh(&self) -> Arc<Manifest> {
        let mut manifest = self.build().unwrap_or_default();
        match self.scan() {
            Ok(scanned) => {
                let mut added = 0usize;
                for (family, version, artifact) in scanned.entries() {
                    if manifest.insert(family, version, artifact) {
                        added += 1;
                    }
                }
                if added > 0 {
                    info!(added, "manifest refresh discovered new artifacts");
                    self.persist(&manifest);
                }
            }
            Err(e) => warn!(error = %e, "artifact scan failed during manifest refresh"),
        }
        self.install(manifest)
    }

    /// Resolve a family and optional version to a manifest entry.
    ///
    /// Without a version the numerically greatest one is selected.
    pub fn resolve(&self, family: &str, version: Option<&str>) -> Result<ResolvedModel, GatewayError> {
        let manifest = self.snapshot();
        let family = canonical_family(family);
        let versions = manifest
            .versions(&family)
            .ok_or_else(|| GatewayError::ModelNotFound(family.clone()))?;

        let (version, artifact) = match version {
            Some(v) => versions.get_key_value(v).ok_or_else(|| GatewayError::VersionNotFound {
                family: family.clone(),
                version: v.to_string(),
            })?,
            None => versions
                .iter()
                .max_by(|(a, _), (b, _)| compare_versions(a, b))
                .ok_or_else(|| GatewayError::VersionNotFound {
                    family: family.clone(),
                    version: "latest".to_string(),
                })?,
        };

        Ok(ResolvedModel {
            artifact: self.model_dir.join(artifact),
            version: version.clone(),
            family,
        })
    }

    /// `true` when the entry resolves and its artifact is still on disk.
    pub fn exists(&self, family: &str, version: Option<&str>) -> bool {
        self.resolve(family, version)
            .map(|m| m.artifact.is_file())
            .unwrap_or(false)
    }

    /// Family → versions, sorted ascending in version order.
    pub fn list(&self) -> BTreeMap<String, Vec<String>> {
        let manifest = self.snapshot();
        manifest
            .families
            .iter()
            .map(|(family, versions)| {
                let mut v: Vec<String> = versions.keys().cloned().collect();
                sort_versions(&mut v);
                (family.clone(), v)
            })
            .collect()
    }

    // ── internals ──────────────────────────────────────────────────────────

    fn install(&self, manifest: Manifest) -> Arc<Manifest> {
        let snapshot = Arc::new(manifest);
        *self.current.write() = snapshot.clone();
        info!(
            families = snapshot.families.len(),
            entries = snapshot.len(),
            "model manifest installed"
        );
        snapshot
    }

    fn build(&self) -> Result<Manifest, GatewayError> {
        match self.read_persisted() {
            Ok(persisted) => {
                let checked = self.retain_existing(persisted);
                if !checked.is_empty() {
                    return Ok(checked);
                }
                warn!(path = %self.manifest_path.display(), "persisted manifest lists no existing artifacts; rescanning");
            }
            Err(reason) => {
                warn!(path = %self.manifest_path.display(), reason = %reason, "persisted manifest unusable; rescanning");
            }
        }

        let scanned = self.scan().map_err(GatewayError::ManifestCorrupt)?;
        if scanned.is_empty() {
            return Err(GatewayError::ManifestCorrupt(format!(
                "no manifest and no artifacts in {}",
                self.model_dir.display()
            )));
        }
        self.persist(&scanned);
        Ok(scanned)
    }

    fn read_persisted(&self) -> Result<Manifest, String> {
        let text = fs::read_to_string(&self.manifest_path).map_err(|e| e.to_string())?;
        serde_json::from_str(&text).map_err(|e| e.to_string())
    }

    /// Drop entries whose artifact is missing; a family left with no entries
    /// is reported as unusable on its own.
    fn retain_existing(&self, persisted: Manifest) -> Manifest {
        let mut checked = Manifest::new();
        for (family, versions) in &persisted.families {
            let mut kept = 0usize;
            for (version, artifact) in versions {
                if self.model_dir.join(artifact).is_file() {
                    checked.insert(family, version.clone(), artifact.clone());
                    kept += 1;
                } else {
                    warn!(family = %family, version = %version, artifact = %artifact, "manifest entry has no artifact on disk; skipping");
                }
            }
            if kept == 0 {
                let err = GatewayError::ManifestCorrupt(format!(
                    "family '{family}' has no loadable artifacts"
                ));
                error!(family = %family, error = %err, "model family unavailable");
            }
        }
        checked
    }

    /// Infer entries from `<family>_<version>.<ext>` filenames.
    fn scan(&self) -> Result<Manifest, String> {
        let entries = fs::read_dir(&self.model_dir)
            .map_err(|e| format!("cannot read {}: {e}", self.model_dir.display()))?;

        let mut manifest = Manifest::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((family, version)) = parse_artifact_name(file_name) else {
                debug!(file = %file_name, "ignoring non-artifact file");
                continue;
            };
            manifest.insert(family, version, file_name);
        }
        Ok(manifest)
    }

    /// Write the manifest via a temporary file and rename.  Failure is
    /// logged; the in-memory manifest stays authoritative.
    fn persist(&self, manifest: &Manifest) {
        let result = serde_json::to_string_pretty(manifest)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                let tmp = self.manifest_path.with_extension("json.tmp");
                fs::write(&tmp, json).map_err(|e| e.to_string())?;
                fs::rename(&tmp, &self.manifest_path).map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => info!(path = %self.manifest_path.display(), entries = manifest.len(), "manifest persisted"),
            Err(e) => warn!(path = %self.manifest_path.display(), error = %e, "failed to persist manifest"),
        }
    }
}

/// Split `<family>_<version>.<ext>`; the version is the token after the last
/// delimiter.
pub fn parse_artifact_name(file_name: &str) -> Option<(&str, &str)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if !ARTIFACT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
        return None;
    }
    let (family, version) = stem.rsplit_once(FAMILY_VERSION_DELIMITER)?;
    if family.is_empty() || version.is_empty() {
        return None;
    }
    Some((family, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = "manifest.json";

    fn dir_with(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for f in files {
            fs::write(dir.path().join(f), b"weights").unwrap();
        }
        dir
    }

    #[test]
    fn parses_artifact_names() {
        assert_eq!(parse_artifact_name("bio_2.pt"), Some(("bio", "2")));
        assert_eq!(parse_artifact_name("deep_bio_10.pth"), Some(("deep_bio", "10")));
        assert_eq!(parse_artifact_name("bio.pt"), None);
        assert_eq!(parse_artifact_name("bio_2.txt"), None);
        assert_eq!(parse_artifact_name("_2.pt"), None);
        assert_eq!(parse_artifact_name("bio_.pt"), None);
    }

    #[test]
    fn latest_is_numeric_not_lexical() {
        let dir = dir_with(&["bio_1.pt", "bio_2.pt", "bio_10.pt"]);
        let mgr = ModelVersionManager::open(dir.path(), MANIFEST);

        let latest = mgr.resolve("bio", None).unwrap();
        assert_eq!(latest.version, "10");
        assert_eq!(latest.model_id(), "bio_10");
        assert_eq!(latest.artifact, dir.path().join("bio_10.pt"));
    }

    #[test]
    fn unknown_family_and_version() {
        let dir = dir_with(&["bio_1.pt", "bio_2.pt"]);
        let mgr = ModelVersionManager::open(dir.path(), MANIFEST);

        assert_eq!(
            mgr.resolve("unknown_family", None),
            Err(GatewayError::ModelNotFound("unknown_family".into()))
        );
        assert!(matches!(
            mgr.resolve("bio", Some("999")),
            Err(GatewayError::VersionNotFound { ref version, .. }) if version == "999"
        ));
        assert_eq!(mgr.resolve("bio", Some("1")).unwrap().version, "1");
    }

    #[test]
    fn aliases_resolve_to_canonical_family() {
        let dir = dir_with(&["biology_1.pt"]);
        let mgr = ModelVersionManager::open(dir.path(), MANIFEST);
        assert_eq!(mgr.resolve("bio", None).unwrap().family, "bio");
        assert_eq!(mgr.resolve("Biology", None).unwrap().family, "bio");
    }

    #[test]
    fn scan_is_persisted_and_round_trips() {
        let dir = dir_with(&["bio_1.pt", "astro_1.onnx", "notes.txt"]);
        let first = ModelVersionManager::open(dir.path(), MANIFEST);
        assert!(dir.path().join(MANIFEST).is_file());

        let reloaded = ModelVersionManager::open(dir.path(), MANIFEST);
        assert_eq!(*first.snapshot(), *reloaded.snapshot());
        assert_eq!(reloaded.snapshot().len(), 2);

        let text = fs::read_to_string(dir.path().join(MANIFEST)).unwrap();
        let parsed: Manifest = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, *first.snapshot());
    }

    #[test]
    fn corrupt_manifest_falls_back_to_scan() {
        let dir = dir_with(&["materials_3.pt"]);
        fs::write(dir.path().join(MANIFEST), "{ not json").unwrap();

        let mgr = ModelVersionManager::open(dir.path(), MANIFEST);
        assert_eq!(mgr.resolve("materials", None).unwrap().version, "3");

        let rewritten: Manifest =
            serde_json::from_str(&fs::read_to_string(dir.path().join(MANIFEST)).unwrap()).unwrap();
        assert_eq!(rewritten.len(), 1);
    }

    #[test]
    fn entries_without_artifacts_are_dropped() {
        let dir = dir_with(&["bio_1.pt"]);
        fs::write(
            dir.path().join(MANIFEST),
            r#"{ "bio": { "1": "bio_1.pt", "2": "bio_2.pt" }, "astro": { "1": "gone.pt" } }"#,
        )
        .unwrap();

        let mgr = ModelVersionManager::open(dir.path(), MANIFEST);
        assert_eq!(mgr.list().get("bio").unwrap(), &vec!["1".to_string()]);
        assert!(matches!(
            mgr.resolve("astro", None),
            Err(GatewayError::ModelNotFound(_))
        ));
    }

    #[test]
    fn empty_directory_starts_degraded() {
        let dir = TempDir::new().unwrap();
        let mgr = ModelVersionManager::open(dir.path(), MANIFEST);
        assert!(mgr.snapshot().is_empty());
        assert!(mgr.list().is_empty());
        assert!(!dir.path().join(MANIFEST).exists());
    }

    #[test]
    fn exists_checks_disk() {
        let dir = dir_with(&["bio_1.pt", "bio_2.pt"]);
        let mgr = ModelVersionManager::open(dir.path(), MANIFEST);
        assert!(mgr.exists("bio", None));
        assert!(!mgr.exists("bio", Some("7")));
        assert!(!mgr.exists("astro", None));

        fs::remove_file(dir.path().join("bio_2.pt")).unwrap();
        assert!(!mgr.exists("bio", Some("2")));
        assert!(mgr.exists("bio", Some("1")));
    }

    #[test]
    fn list_is_sorted_by_version() {
        let dir = dir_with(&["bio_10.pt", "bio_2.pt", "bio_1.pt", "astro_1.pt"]);
        let mgr = ModelVersionManager::open(dir.path(), MANIFEST);
        let listed = mgr.list();
        assert_eq!(listed["bio"], vec!["1", "2", "10"]);
        assert_eq!(listed["astro"], vec!["1"]);
    }

    #[test]
    fn mixed_versions_resolve_to_the_greatest_number() {
        let dir = dir_with(&["bio_9.pt", "bio_10.pt", "bio_2b.pt"]);
        let mgr = ModelVersionManager::open(dir.path(), MANIFEST);

        assert_eq!(mgr.resolve("bio", None).unwrap().version, "10");
        assert_eq!(mgr.list()["bio"], vec!["2b", "9", "10"]);
        assert_eq!(mgr.resolve("bio", Some("2b")).unwrap().model_id(), "bio_2b");
    }

    #[test]
    fn refresh_appends_new_artifacts_and_swaps_snapshot() {
        let dir = dir_with(&["bio_1.pt"]);
        let mgr = ModelVersionManager::open(dir.path(), MANIFEST);
        let before = mgr.snapshot();

        fs::write(dir.path().join("bio_2.pt"), b"weights").unwrap();
        let after = mgr.refresh();

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert_eq!(mgr.resolve("bio", None).unwrap().version, "2");

        let persisted: Manifest =
            serde_json::from_str(&fs::read_to_string(dir.path().join(MANIFEST)).unwrap()).unwrap();
        assert_eq!(persisted.len(), 2);
    }
}
