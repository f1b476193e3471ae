use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use engine::render::Canvas;
use engine::SceneSettings;
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::retrieval::TierKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    fn new(name: &str, keywords: &[&str]) -> Self {
        CategoryRule {
            name: name.to_string(),
            keywords: strings(keywords),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub db_path: PathBuf,
    /// Seconds between polls for pending runs.
    pub poll_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1:7777".to_string(),
            db_path: PathBuf::from(".cache/reeld.db"),
            poll_interval_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Candidates requested per segment (K).
    pub variation_count: usize,
    pub tiers: Vec<TierKind>,
    /// Ordered; the first category with a matching keyword wins.
    pub category_table: Vec<CategoryRule>,
    pub default_category: String,
    pub curated_links: BTreeMap<String, Vec<String>>,
    pub max_link_attempts: usize,
    pub weak_terms: Vec<String>,
    pub exception_terms: Vec<String>,
    pub weak_replacement: String,
    pub technical_words: Vec<String>,
    pub term_map: BTreeMap<String, String>,
    pub mood_fallbacks: Vec<String>,
    pub generic_fallback: String,
    pub min_source_duration: f64,
    pub per_page: usize,
    pub long_form_results: usize,
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let term_map = [
            ("lamborghini", "supercar"),
            ("ferrari", "supercar"),
            ("porsche", "sports car"),
            ("bugatti", "supercar"),
            ("rolex", "luxury watch"),
            ("mma", "fighter"),
            ("ufc", "fighter"),
            ("bodybuilder", "gym"),
            ("hustle", "working late"),
            ("grindset", "working late"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        ResolverConfig {
            variation_count: 3,
            tiers: vec![
                TierKind::Local,
                TierKind::Curated,
                TierKind::Search,
                TierKind::Mood,
                TierKind::Generic,
            ],
            category_table: vec![
                CategoryRule::new(
                    "COMBAT",
                    &["boxing", "boxer", "fight", "fighter", "mma", "martial", "punch", "sparring", "kickboxing", "combat"],
                ),
                CategoryRule::new(
                    "CARS",
                    &["car", "cars", "supercar", "drive", "driving", "lamborghini", "ferrari", "porsche", "racing", "highway"],
                ),
                CategoryRule::new(
                    "STOIC",
                    &["statue", "marble", "ancient", "rome", "roman", "greek", "temple", "emperor", "philosopher", "stoic"],
                ),
                CategoryRule::new(
                    "LUXURY",
                    &["luxury", "jet", "yacht", "mansion", "champagne", "penthouse", "rolex", "wealth", "rich"],
                ),
                CategoryRule::new(
                    "GYM",
                    &["gym", "workout", "training", "lifting", "muscle", "weights", "deadlift", "bodybuilding"],
                ),
            ],
            default_category: "STOIC".to_string(),
            curated_links: BTreeMap::new(),
            max_link_attempts: 3,
            weak_terms: strings(&[
                "nature", "sky", "clouds", "forest", "ocean", "sunset", "sunrise", "rain", "fog",
                "calm", "peaceful", "landscape", "flowers", "beach", "meditation", "abstract",
            ]),
            exception_terms: strings(&["statue", "lion", "wolf", "chess", "crown", "eagle", "sword"]),
            weak_replacement: "man walking alone city night".to_string(),
            technical_words: strings(&[
                "4k", "hd", "uhd", "footage", "stock", "cinematic", "video", "clip", "slowmo",
                "slow", "motion", "vertical", "b-roll", "broll", "drone",
            ]),
            term_map,
            mood_fallbacks: strings(&[
                "dark moody city night",
                "man walking alone city",
                "neon street night",
                "luxury lifestyle night",
                "boxer training dark gym",
            ]),
            generic_fallback: "motivation success".to_string(),
            min_source_duration: 3.0,
            per_page: 5,
            long_form_results: 5,
            request_delay_ms: 500,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub ytdlp_bin: String,
    pub subprocess_timeout_secs: u64,
    pub head_buffer_secs: f64,
    pub tail_buffer_secs: f64,
    /// Length of clips cut out of long-form sources.
    pub clip_secs: f64,
    pub primary_format: String,
    pub fallback_format: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            ytdlp_bin: "yt-dlp".to_string(),
            subprocess_timeout_secs: 120,
            head_buffer_secs: 15.0,
            tail_buffer_secs: 15.0,
            clip_secs: 6.0,
            primary_format: "bestvideo[height<=1920][ext=mp4]+bestaudio[ext=m4a]/best[height<=1920]".to_string(),
            fallback_format: "best[height<=480]/worst".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub probe_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub canvas: Canvas,
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            probe_timeout_secs: 30,
            render_timeout_secs: 600,
            canvas: Canvas::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignConfig {
    /// Skip applied when a sub-cut would run past the end of its asset.
    pub jump_cut_secs: f64,
    /// Longest run of segments bound to one category before the next pick
    /// of that category is penalised.
    pub max_consecutive_same_category: usize,
}

impl Default for AssignConfig {
    fn default() -> Self {
        AssignConfig {
            jump_cut_secs: 1.5,
            max_consecutive_same_category: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scenes: SceneSettings,
    pub resolver: ResolverConfig,
    pub extract: ExtractConfig,
    pub media: MediaConfig,
    pub assign: AssignConfig,
    pub work_dir: PathBuf,
    pub local_footage_dir: Option<PathBuf>,
    /// Fixed seed for reproducible runs; random per run when unset.
    pub rng_seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            scenes: SceneSettings::default(),
            resolver: ResolverConfig::default(),
            extract: ExtractConfig::default(),
            media: MediaConfig::default(),
            assign: AssignConfig::default(),
            work_dir: PathBuf::from(".cache/runs"),
            local_footage_dir: None,
            rng_seed: None,
        }
    }
}

impl AppConfig {
    /// Load from `REELD_CONFIG` (JSON) when set, then apply env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("REELD_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => AppConfig::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("REELD_BIND") {
            self.server.bind = bind;
        }
        if let Ok(db_path) = std::env::var("REELD_DB_PATH") {
            self.server.db_path = PathBuf::from(db_path);
        }
        if let Ok(work_dir) = std::env::var("REELD_WORK_DIR") {
            self.work_dir = PathBuf::from(work_dir);
        }
        if let Ok(local) = std::env::var("REELD_LOCAL_FOOTAGE_DIR") {
            self.local_footage_dir = Some(PathBuf::from(local));
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.scenes
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let resolver = &self.resolver;
        if resolver.variation_count == 0 {
            return Err(PipelineError::Config("variation_count must be at least 1".into()));
        }
        if resolver.tiers.is_empty() {
            return Err(PipelineError::Config("at least one resolution tier is required".into()));
        }
        if resolver.max_link_attempts == 0 {
            return Err(PipelineError::Config("max_link_attempts must be at least 1".into()));
        }

        let positive = [
            ("extract.clip_secs", self.extract.clip_secs),
            ("assign.jump_cut_secs", self.assign.jump_cut_secs),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PipelineError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        let non_negative = [
            ("resolver.min_source_duration", resolver.min_source_duration),
            ("extract.head_buffer_secs", self.extract.head_buffer_secs),
            ("extract.tail_buffer_secs", self.extract.tail_buffer_secs),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PipelineError::Config(format!("{name} must not be negative, got {value}")));
            }
        }
        let timeouts = [
            ("resolver.request_timeout_secs", resolver.request_timeout_secs),
            ("extract.subprocess_timeout_secs", self.extract.subprocess_timeout_secs),
            ("media.probe_timeout_secs", self.media.probe_timeout_secs),
            ("media.render_timeout_secs", self.media.render_timeout_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(PipelineError::Config(format!("{name} must be at least 1 second")));
            }
        }
        Ok(())
    }
}
