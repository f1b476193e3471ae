pub mod pexels;
pub mod pixabay;
pub mod youtube;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// How a hit is turned into a local file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HitSource {
    /// `download_url` is a finished short clip.
    Direct,
    /// `download_url` is a long video; a window is extracted from it.
    LongForm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockHit {
    /// Stable identity of the footage, used for dedup.
    pub uri: String,
    pub download_url: String,
    pub duration_secs: Option<f64>,
    pub width: u32,
    pub height: u32,
    pub source: HitSource,
}

impl StockHit {
    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

#[async_trait::async_trait]
pub trait StockProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str, per_page: usize) -> Result<Vec<StockHit>>;
}

/// Rendition choice shared by the providers: portrait files first, then
/// the largest frame.
pub(crate) fn pick_rendition<T>(files: &[T], dims: impl Fn(&T) -> (u32, u32)) -> Option<&T> {
    files.iter().max_by_key(|file| {
        let (w, h) = dims(file);
        (h > w, u64::from(w) * u64::from(h))
    })
}

/// Read a provider key from the environment, the way other API keys are read.
pub(crate) fn get_api_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|key| !key.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_portrait_over_larger_landscape() {
        let files = [(3840u32, 2160u32), (1080, 1920), (720, 1280)];
        let picked = pick_rendition(&files, |f| *f).unwrap();
        assert_eq!(*picked, (1080, 1920));
    }

    #[test]
    fn falls_back_to_largest_landscape() {
        let files = [(1280u32, 720u32), (1920, 1080)];
        let picked = pick_rendition(&files, |f| *f).unwrap();
        assert_eq!(*picked, (1920, 1080));
    }
}
