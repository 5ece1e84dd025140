//! Knowledge Base: a content-addressed store of accepted hypotheses plus a
//! small set of built-in native skills, seeded at construction so KB-hit
//! scenarios work without a pre-built WASM corpus. Persists artifacts to a
//! directory (`<id>@<version>/manifest.json` + code blob) and reloads them
//! on start, skipping (and logging) any artifact that fails sha256
//! verification.

pub mod error;
pub mod skill;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use forge_core::{Hypothesis, Lang, Manifest, Task};
use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;

pub use error::KbError;
pub use skill::{NativeSkill, Skill};

struct StoredManifest {
    manifest: Manifest,
    code: Arc<Vec<u8>>,
    inserted_at: usize,
}

/// Content-addressed store of durable hypotheses plus the process's native
/// built-ins. `find`/`save_hypothesis` are the only two operations the
/// Solver needs.
pub struct Kb {
    root: PathBuf,
    write_lock: AsyncMutex<()>,
    manifests: RwLock<Vec<StoredManifest>>,
    natives: Vec<Arc<NativeSkill>>,
}

impl Kb {
    /// Open (creating if absent) the KB rooted at `root`, seed built-in
    /// skills, and load any previously persisted artifacts.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, KbError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| KbError::ReadRoot {
                path: root.display().to_string(),
                source: e,
            })?;
        let natives = skill::builtin_skills().into_iter().map(Arc::new).collect();
        let kb = Kb {
            root,
            write_lock: AsyncMutex::new(()),
            manifests: RwLock::new(Vec::new()),
            natives,
        };
        kb.reload().await?;
        Ok(kb)
    }

    /// Re-walk the KB root and rebuild the in-memory index. Invalid or
    /// mismatched artifacts are skipped and logged, never silently
    /// accepted.
    pub async fn reload(&self) -> Result<(), KbError> {
        let mut entries =
            tokio::fs::read_dir(&self.root)
                .await
                .map_err(|e| KbError::ReadRoot {
                    path: self.root.display().to_string(),
                    source: e,
                })?;

        let mut loaded = Vec::new();
        let mut idx = 0usize;
        while let Some(entry) = entries.next_entry().await.map_err(|e| KbError::ReadRoot {
            path: self.root.display().to_string(),
            source: e,
        })? {
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            match load_artifact(&path).await {
                Some((manifest, code)) => {
                    loaded.push(StoredManifest {
                        manifest,
                        code,
                        inserted_at: idx,
                    });
                    idx += 1;
                }
                None => {
                    tracing::warn!(dir = %path.display(), "skipping invalid kb artifact");
                }
            }
        }
        *self.manifests.write() = loaded;
        Ok(())
    }

    /// Best-effort, confidence-ordered lookup: a skill matches if its
    /// domain equals `task.domain` or any of its tags appears among
    /// `task.spec.props`'s values. Exact tag matches outrank a domain
    /// match, which outranks nothing (no match at all is excluded).
    pub fn find(&self, task: &Task) -> Vec<Skill> {
        let mut matches: Vec<(f64, usize, Skill)> = Vec::new();

        for (i, native) in self.natives.iter().enumerate() {
            if let Some(confidence) = match_confidence(&native.domain, &native.tags, task) {
                matches.push((confidence, i, Skill::Native(native.clone())));
            }
        }

        let stored = self.manifests.read();
        for sm in stored.iter() {
            if let Some(confidence) = match_confidence(&sm.manifest.domain, &sm.manifest.tags, task) {
                matches.push((
                    confidence,
                    self.natives.len() + sm.inserted_at,
                    Skill::Wasm {
                        manifest: sm.manifest.clone(),
                        code: sm.code.clone(),
                    },
                ));
            }
        }
        drop(stored);

        matches.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
        matches.into_iter().map(|(_, _, s)| s).collect()
    }

    /// Durably persist `h` so it is discoverable on subsequent `find`
    /// calls. Assigns `id = "hypothesis.<h.id>"`, version `1.0.0` (bumped
    /// on collision), derives domain from `h.meta.domain` or defaults to
    /// `generated`. Writes are serialized via a single writer lock and
    /// committed atomically (temp-file rename) so concurrent readers never
    /// observe a half-written artifact.
    pub async fn save_hypothesis(&self, h: &Hypothesis, quality: f64) -> Result<Manifest, KbError> {
        let _guard = self.write_lock.lock().await;

        let domain = h
            .meta
            .get("domain")
            .and_then(Value::as_str)
            .unwrap_or("generated")
            .to_string();

        let base_id = format!("hypothesis.{}", h.id);
        let version = self.next_free_version(&base_id);
        let sha256 = hex::encode(Sha256::digest(&h.bytes));

        let manifest = Manifest {
            id: base_id,
            version,
            domain,
            tags: Vec::new(),
            lang: Lang::Wasm,
            entry: "solve".to_string(),
            code_path: Some("code.wasm".to_string()),
            sha256: Some(sha256),
            tests: Vec::new(),
            created_at: Utc::now(),
        };

        tracing::debug!(quality, id = %manifest.id, "persisting accepted hypothesis");

        let dir = self.root.join(manifest.qualified_id());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| KbError::Write {
                id: manifest.id.clone(),
                source: e,
            })?;

        let manifest_json = serde_json::to_vec_pretty(&manifest).map_err(|e| KbError::Serialize {
            id: manifest.id.clone(),
            source: e,
        })?;
        atomic_write(&dir, "manifest.json", &manifest_json).await?;
        atomic_write(&dir, "code.wasm", &h.bytes).await?;

        let mut stored = self.manifests.write();
        let inserted_at = stored.len();
        stored.push(StoredManifest {
            manifest: manifest.clone(),
            code: Arc::new(h.bytes.clone()),
            inserted_at,
        });

        Ok(manifest)
    }

    fn next_free_version(&self, base_id: &str) -> String {
        let stored = self.manifests.read();
        let mut bump = 0u32;
        loop {
            let candidate = if bump == 0 {
                "1.0.0".to_string()
            } else {
                format!("1.0.{bump}")
            };
            let taken = stored
                .iter()
                .any(|sm| sm.manifest.id == base_id && sm.manifest.version == candidate);
            if !taken {
                return candidate;
            }
            bump += 1;
        }
    }
}

fn match_confidence(domain: &str, tags: &[String], task: &Task) -> Option<f64> {
    let domain_match = domain == task.domain;
    let tag_hits = tags
        .iter()
        .filter(|tag| {
            task.spec
                .props
                .values()
                .any(|v| v.as_str() == Some(tag.as_str()))
        })
        .count();

    if !domain_match && tag_hits == 0 {
        return None;
    }
    Some(if domain_match { 1.0 } else { 0.0 } + tag_hits as f64 * 2.0)
}

async fn load_artifact(dir: &Path) -> Option<(Manifest, Arc<Vec<u8>>)> {
    let manifest_bytes = tokio::fs::read(dir.join("manifest.json")).await.ok()?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes).ok()?;

    if manifest.lang != Lang::Wasm {
        return None;
    }
    let code_path = manifest.code_path.as_ref()?;
    let code = tokio::fs::read(dir.join(code_path)).await.ok()?;
    let expected = manifest.sha256.as_ref()?;
    let actual = hex::encode(Sha256::digest(&code));
    if &actual != expected {
        tracing::warn!(id = %manifest.id, "sha256 mismatch, skipping artifact");
        return None;
    }
    Some((manifest, Arc::new(code)))
}

async fn atomic_write(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), KbError> {
    let tmp = dir.join(format!("{name}.tmp"));
    let dest = dir.join(name);
    tokio::fs::write(&tmp, bytes).await.map_err(|e| KbError::Write {
        id: dest.display().to_string(),
        source: e,
    })?;
    tokio::fs::rename(&tmp, &dest).await.map_err(|e| KbError::Write {
        id: dest.display().to_string(),
        source: e,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::HypothesisSource;

    #[tokio::test]
    async fn builtin_reverse_skill_matches_text_domain() {
        let dir = tempfile::tempdir().unwrap();
        let kb = Kb::open(dir.path()).await.unwrap();
        let task = Task::new("text", serde_json::json!({"text": "hello"}));
        let skills = kb.find(&task);
        assert!(skills.iter().any(|s| s.id() == "text/reverse.v1"));
    }

    #[tokio::test]
    async fn save_then_find_returns_the_persisted_hypothesis() {
        let dir = tempfile::tempdir().unwrap();
        let kb = Kb::open(dir.path()).await.unwrap();
        let mut h = Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, vec![0, 1, 2, 3]);
        h.meta.insert("domain".to_string(), Value::String("widgets".to_string()));

        let manifest = kb.save_hypothesis(&h, 1.0).await.unwrap();
        assert_eq!(manifest.domain, "widgets");

        let task = Task::new("widgets", Value::Null);
        let skills = kb.find(&task);
        assert!(skills.iter().any(|s| s.id() == manifest.id));
    }

    #[tokio::test]
    async fn reload_after_restart_recovers_persisted_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let h = Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, vec![9, 9, 9]);
        {
            let kb = Kb::open(dir.path()).await.unwrap();
            kb.save_hypothesis(&h, 1.0).await.unwrap();
        }
        let kb2 = Kb::open(dir.path()).await.unwrap();
        let task = Task::new("generated", Value::Null);
        assert!(!kb2.find(&task).is_empty());
    }

    #[tokio::test]
    async fn version_bumps_on_id_collision() {
        let dir = tempfile::tempdir().unwrap();
        let kb = Kb::open(dir.path()).await.unwrap();
        let mut h = Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, vec![1]);
        h.id = "fixed-id".to_string();
        let m1 = kb.save_hypothesis(&h, 1.0).await.unwrap();
        let m2 = kb.save_hypothesis(&h, 1.0).await.unwrap();
        assert_eq!(m1.id, m2.id);
        assert_ne!(m1.version, m2.version);
    }

    #[tokio::test]
    async fn tampered_code_blob_is_skipped_on_reload() {
        let dir = tempfile::tempdir().unwrap();
        let h = Hypothesis::new(HypothesisSource::Llm, Lang::Wasm, vec![5, 5, 5]);
        let manifest;
        {
            let kb = Kb::open(dir.path()).await.unwrap();
            manifest = kb.save_hypothesis(&h, 1.0).await.unwrap();
        }
        let artifact_dir = dir.path().join(manifest.qualified_id());
        tokio::fs::write(artifact_dir.join("code.wasm"), b"tampered")
            .await
            .unwrap();

        let kb2 = Kb::open(dir.path()).await.unwrap();
        let task = Task::new("generated", Value::Null);
        assert!(!kb2.find(&task).iter().any(|s| s.id() == manifest.id));
    }
}
