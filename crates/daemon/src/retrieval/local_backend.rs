use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use engine::SourceTier;

use crate::context::ResolutionContext;
use crate::media::compute_file_checksum;
use crate::retrieval::query::extract_keywords;
use crate::retrieval::{AssetCandidate, ResolutionTier, ResolveRequest, TierKind};

const FOOTAGE_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm"];

#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    /// `local:<sha256>`, so one file under two names is still one asset.
    pub uri: String,
    pub keywords: Vec<String>,
}

impl LocalFile {
    fn matches(&self, keywords: &[String]) -> bool {
        self.keywords.iter().any(|k| keywords.contains(k))
    }
}

/// The pre-approved footage directory, scanned once per run.
#[derive(Debug, Clone, Default)]
pub struct LocalPool {
    files: Vec<LocalFile>,
}

impl LocalPool {
    pub fn empty() -> Self {
        LocalPool::default()
    }

    pub fn from_files(files: Vec<LocalFile>) -> Self {
        LocalPool { files }
    }

    pub async fn scan(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current)
                .await
                .with_context(|| format!("Failed to read footage dir {}", current.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if is_footage(&path) {
                    paths.push(path);
                }
            }
        }
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let checksum = compute_file_checksum(&path).await?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            files.push(LocalFile {
                uri: format!("local:{checksum}"),
                keywords: extract_keywords(&stem),
                path,
            });
        }
        tracing::info!("[LOCAL] {} footage files in {}", files.len(), dir.display());
        Ok(LocalPool { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_footage(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FOOTAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct LocalTier {
    pool: Arc<LocalPool>,
}

impl LocalTier {
    pub fn new(pool: Arc<LocalPool>) -> Self {
        LocalTier { pool }
    }
}

#[async_trait::async_trait]
impl ResolutionTier for LocalTier {
    fn kind(&self) -> TierKind {
        TierKind::Local
    }

    fn is_exclusive(&self) -> bool {
        !self.pool.is_empty()
    }

    async fn attempt_resolve(
        &self,
        request: &ResolveRequest,
        found: &mut Vec<AssetCandidate>,
        ctx: &mut ResolutionContext,
    ) {
        let pool = &self.pool.files;
        if pool.is_empty() {
            return;
        }
        let keywords = extract_keywords(&request.query);
        let preferred: Vec<bool> = pool
            .iter()
            .map(|f| f.matches(&keywords) && !ctx.is_seen(&f.uri))
            .collect();

        // Two full passes are enough to see every file at least once.
        let mut draws = 0;
        while !request.is_satisfied(found) && draws < pool.len() * 2 {
            draws += 1;
            let Some(idx) = ctx.next_local(pool.len(), |i| preferred[i]) else {
                break;
            };
            let file = &pool[idx];
            if found.iter().any(|c| c.uri == file.uri) {
                continue;
            }
            // Same content under another name, before the pool ran dry.
            if !ctx.mark_seen(&file.uri) && ctx.reshuffle_events() == 0 {
                continue;
            }
            found.push(AssetCandidate {
                uri: file.uri.clone(),
                source_tier: SourceTier::Local,
                category: None,
                path: file.path.clone(),
                score: 0,
            });
        }
    }
}
