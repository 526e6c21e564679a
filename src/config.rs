use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dailybrief::calibrate::{
    BACKLOG_AGE_DAYS, CalibrationRules, DEFAULT_DEEP_SOURCES, SignalExtractor, TierCalibrator,
};
use dailybrief::llm::{
    DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL, GEMINI_API_KEY_ENV, GeminiClient, GeminiConfig, OPENAI_API_KEY_ENV,
    OpenAiClient, OpenAiConfig, SummarizationModel,
};
use dailybrief::scheduler::{LaneConfig, LaneId, LaneSet, ProviderLane, RetryPolicy, SchedulerConfig};
use dailybrief::selection::{ComposerConfig, DiversityLimits};
use dailybrief::summary::{BudgetHint, Intake};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub database: DatabaseConfig,
    pub briefing: BriefingConfig,
    pub calibration: CalibrationConfig,
    pub intake: IntakeConfig,
    pub scheduler: SchedulerSection,
    pub lanes: LanesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("dailybrief"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefingConfig {
    pub max_items: usize,
    pub max_deep_dives: usize,
    pub max_per_source: usize,
    pub max_per_source_with_deep_dive: usize,
    pub fresh_max_age_weeks: i64,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self {
            max_items: 18,
            max_deep_dives: 3,
            max_per_source: 2,
            max_per_source_with_deep_dive: 3,
            fresh_max_age_weeks: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub long_form_words: u32,
    pub deep_dive_min_words: u32,
    pub deep_dive_min_insights: usize,
    pub short_content_max_words: u32,
    pub deep_sources: Vec<String>,
    pub backlog_age_days: i64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let rules = CalibrationRules::default();
        Self {
            long_form_words: rules.long_form_words,
            deep_dive_min_words: rules.deep_dive_min_words,
            deep_dive_min_insights: rules.deep_dive_min_insights,
            short_content_max_words: rules.short_content_max_words,
            deep_sources: DEFAULT_DEEP_SOURCES.iter().map(|s| s.to_string()).collect(),
            backlog_age_days: BACKLOG_AGE_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub min_word_count: u32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            min_word_count: Intake::default().min_word_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub primary_share: f64,
    pub max_attempts: u32,
    pub rate_limit_base_secs: u64,
    pub transient_base_ms: u64,
    pub progress_interval_secs: u64,
    pub sink_capacity: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            primary_share: 0.7,
            max_attempts: 3,
            rate_limit_base_secs: 30,
            transient_base_ms: 1000,
            progress_interval_secs: 30,
            sink_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    OpenAi,
}

impl Provider {
    fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => DEFAULT_GEMINI_MODEL,
            Provider::OpenAi => DEFAULT_OPENAI_MODEL,
        }
    }

    fn default_api_key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => GEMINI_API_KEY_ENV,
            Provider::OpenAi => OPENAI_API_KEY_ENV,
        }
    }

    fn default_concurrency(&self) -> usize {
        match self {
            Provider::Gemini => 5,
            Provider::OpenAi => 3,
        }
    }

    fn default_max_input_tokens(&self) -> usize {
        match self {
            Provider::Gemini => 120_000,
            Provider::OpenAi => 100_000,
        }
    }
}

/// One provider lane. Unset fields take the provider's defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSection {
    pub provider: Provider,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_input_tokens: Option<usize>,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_output_tokens() -> u32 {
    4096
}

impl LaneSection {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            enabled: default_enabled(),
            model: None,
            api_key_env: None,
            concurrency: None,
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_input_tokens: None,
            max_output_tokens: default_max_output_tokens(),
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(self.provider.default_model())
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or(self.provider.default_api_key_env())
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(self.provider.default_concurrency())
    }

    fn lane_config(&self) -> LaneConfig {
        LaneConfig {
            concurrency: self.concurrency(),
            timeout: Duration::from_secs(self.timeout_secs),
            budget: BudgetHint {
                max_input_tokens: self.max_input_tokens.unwrap_or(self.provider.default_max_input_tokens()),
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    fn build_model(&self) -> Result<Arc<dyn SummarizationModel>> {
        let timeout = Duration::from_secs(self.timeout_secs);
        let model: Arc<dyn SummarizationModel> = match self.provider {
            Provider::Gemini => Arc::new(GeminiClient::from_env(
                self.api_key_env(),
                GeminiConfig {
                    model: self.model().to_string(),
                    temperature: self.temperature,
                    timeout,
                },
            )?),
            Provider::OpenAi => Arc::new(OpenAiClient::from_env(
                self.api_key_env(),
                OpenAiConfig {
                    model: self.model().to_string(),
                    temperature: self.temperature,
                    timeout,
                },
            )?),
        };
        Ok(model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanesConfig {
    #[serde(default = "default_lane_a")]
    pub a: LaneSection,
    #[serde(default = "default_lane_b")]
    pub b: LaneSection,
}

fn default_lane_a() -> LaneSection {
    LaneSection::new(Provider::Gemini)
}

fn default_lane_b() -> LaneSection {
    LaneSection::new(Provider::OpenAi)
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            a: default_lane_a(),
            b: default_lane_b(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            database: DatabaseConfig::default(),
            briefing: BriefingConfig::default(),
            calibration: CalibrationConfig::default(),
            intake: IntakeConfig::default(),
            scheduler: SchedulerSection::default(),
            lanes: LanesConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn calibrator(&self) -> TierCalibrator {
        let c = &self.calibration;
        TierCalibrator::new(CalibrationRules {
            long_form_words: c.long_form_words,
            deep_dive_min_words: c.deep_dive_min_words,
            deep_dive_min_insights: c.deep_dive_min_insights,
            short_content_max_words: c.short_content_max_words,
            deep_sources: c.deep_sources.iter().cloned().collect(),
        })
    }

    pub fn signal_extractor(&self) -> SignalExtractor {
        SignalExtractor::new(self.calibration.backlog_age_days)
    }

    pub fn intake(&self) -> Intake {
        Intake::new(self.intake.min_word_count)
    }

    pub fn composer_config(&self) -> ComposerConfig {
        let b = &self.briefing;
        ComposerConfig {
            max_items: b.max_items,
            max_deep_dives: b.max_deep_dives,
            diversity: DiversityLimits {
                max_per_source: b.max_per_source,
                max_with_deep_dive: b.max_per_source_with_deep_dive,
            },
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let s = &self.scheduler;
        SchedulerConfig {
            primary_share: s.primary_share,
            channel_capacity: s.sink_capacity,
            progress_interval: Duration::from_secs(s.progress_interval_secs.max(1)),
            seed: None,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let s = &self.scheduler;
        RetryPolicy {
            max_attempts: s.max_attempts.max(1),
            rate_limit_base: Duration::from_secs(s.rate_limit_base_secs),
            transient_base: Duration::from_millis(s.transient_base_ms),
        }
    }

    /// Build whichever lanes can be initialised. A lane whose API key is
    /// missing is left out with a warning; the caller decides whether an
    /// empty set is fatal.
    pub fn build_lanes(&self) -> LaneSet {
        let build = |id: LaneId, section: &LaneSection| -> Option<ProviderLane> {
            if !section.enabled {
                log::info!("Lane {} disabled in config", id);
                return None;
            }
            match section.build_model() {
                Ok(model) => Some(ProviderLane::new(id, model, section.lane_config())),
                Err(e) => {
                    log::warn!("Lane {} ({:?}) unavailable: {}", id, section.provider, e);
                    None
                }
            }
        };
        LaneSet::new(build(LaneId::A, &self.lanes.a), build(LaneId::B, &self.lanes.b))
    }
}
