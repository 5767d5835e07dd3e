use crate::types::{PulseError, Result, TimeWindow, Trigger};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Artifact name prefixes, one per stage output plus the run summary.
pub const PREFIX_REVIEWS: &str = "reviews";
pub const PREFIX_CLASSIFIED: &str = "classified";
pub const PREFIX_THEMES: &str = "themes";
pub const PREFIX_PULSE: &str = "pulse";
pub const PREFIX_SEND_LOG: &str = "send_log";
pub const PREFIX_RUN: &str = "run";

const KNOWN_PREFIXES: [&str; 6] = [
    PREFIX_REVIEWS,
    PREFIX_CLASSIFIED,
    PREFIX_THEMES,
    PREFIX_PULSE,
    PREFIX_SEND_LOG,
    PREFIX_RUN,
];

/// Naming key shared by every artifact of one invocation.
///
/// Names carry the trigger, the window dates, the run timestamp (millisecond
/// precision) and a short run-id qualifier, so two invocations launched within
/// the same instant still write disjoint artifact sets.
#[derive(Debug, Clone)]
pub struct ArtifactKey {
    trigger: Trigger,
    window: TimeWindow,
    stamp: DateTime<Utc>,
    run_tag: String,
}

impl ArtifactKey {
    pub fn new(trigger: Trigger, window: TimeWindow, stamp: DateTime<Utc>, run_id: Uuid) -> Self {
        let run_tag = run_id.simple().to_string()[..8].to_string();
        Self {
            trigger,
            window,
            stamp,
            run_tag,
        }
    }

    pub fn name(&self, prefix: &str) -> String {
        format!(
            "{prefix}_{trigger}_{start}_{end}_{stamp}_{tag}.json",
            trigger = self.trigger,
            start = self.window.start_date.format("%Y%m%d"),
            end = self.window.end_date.format("%Y%m%d"),
            stamp = self.stamp.format("%Y%m%dT%H%M%S%3fZ"),
            tag = self.run_tag,
        )
    }
}

/// Flat-file store for dated, typed JSON records. Pure I/O, no business
/// logic; everything else references artifacts by name through this store.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Reject names outside the artifact naming pattern. Guards the download
    /// surface against traversal and arbitrary reads.
    pub fn validate_name(name: &str) -> Result<()> {
        let valid = name.ends_with(".json")
            && !name.contains("..")
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && KNOWN_PREFIXES
                .iter()
                .any(|p| name.starts_with(&format!("{p}_")));
        if valid {
            Ok(())
        } else {
            Err(PulseError::InvalidArtifactName {
                name: name.to_string(),
            })
        }
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<String> {
        Self::validate_name(name)?;
        let path = self.root.join(name);
        let body = serde_json::to_vec_pretty(value)?;
        fs::write(&path, body)?;
        debug!("wrote artifact {}", path.display());
        Ok(name.to_string())
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let bytes = self.read_bytes(name)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn read_bytes(&self, name: &str) -> Result<Vec<u8>> {
        Self::validate_name(name)?;
        let path = self.root.join(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PulseError::ArtifactNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.root.join(name).is_file()
    }

    /// Artifact names under the store matching a prefix, sorted.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) && name.ends_with(".json") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key() -> ArtifactKey {
        let window = TimeWindow::trailing(NaiveDate::from_ymd_opt(2025, 11, 27).unwrap(), 28).unwrap();
        ArtifactKey::new(Trigger::Manual, window, Utc::now(), Uuid::new_v4())
    }

    #[test]
    fn generated_names_pass_validation() {
        let key = key();
        for prefix in KNOWN_PREFIXES {
            ArtifactStore::validate_name(&key.name(prefix)).unwrap();
        }
    }

    #[test]
    fn validation_rejects_traversal_and_foreign_names() {
        for bad in [
            "../etc/passwd",
            "pulse_../x.json",
            "pulse_a/b.json",
            "notes_20251127.json",
            "pulse_20251127.txt",
            "",
        ] {
            assert!(
                matches!(
                    ArtifactStore::validate_name(bad),
                    Err(PulseError::InvalidArtifactName { .. })
                ),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn missing_artifact_is_a_typed_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let err = store.read_bytes(&key().name(PREFIX_PULSE)).unwrap_err();
        assert!(matches!(err, PulseError::ArtifactNotFound { .. }));
    }

    #[test]
    fn distinct_runs_in_the_same_instant_get_distinct_names() {
        let window = TimeWindow::trailing(NaiveDate::from_ymd_opt(2025, 11, 27).unwrap(), 28).unwrap();
        let stamp = Utc::now();
        let a = ArtifactKey::new(Trigger::Manual, window, stamp, Uuid::new_v4());
        let b = ArtifactKey::new(Trigger::Manual, window, stamp, Uuid::new_v4());
        assert_ne!(a.name(PREFIX_PULSE), b.name(PREFIX_PULSE));
    }
}
