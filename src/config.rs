use crate::classifier::ClassifierConfig;
use crate::domain::types::{BufferCapacity, FrameLength, MaxBatchMessages, MaxLineLength};
use crate::domain::validation_constants::{destination, frame, line, packet, ring, unit, worker};
use crate::error::{Error, Result};
use crate::extraction::WorkerConfig;
use crate::pipeline::{OverflowPolicy, RingBufferConfig};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SWITCHYARD";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub ring_buffer: RingBufferSettings,
    pub classifier: ClassifierSettings,
    pub worker: WorkerSettings,
    pub replay: ReplaySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RingBufferSettings {
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierSettings {
    pub max_packet_payload: usize,
    pub frame_length: usize,
    pub frame_zero_run: usize,
    pub frame_destination_prefix: String,
    pub max_line: usize,
    pub unit_prefix: String,
    pub sync_marker: String,
    pub declaration_keywords: Vec<String>,
    pub incomplete_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerSettings {
    pub max_batch_messages: usize,
    pub idle_wait_ms: u64,
    pub min_pass_interval_ms: u64,
}

/// How the replay binary feeds a capture file into the pipeline
#[derive(Debug, Deserialize, Clone)]
pub struct ReplaySettings {
    pub capture: Option<PathBuf>,
    /// Bytes handed to `ingest` per call, like one serial read
    pub chunk_size: usize,
    /// Pause between chunks; zero replays as fast as possible
    pub chunk_interval_ms: u64,
    /// Destinations to register and mark ready before replay starts
    pub destinations: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Settings {
    /// Defaults, then `config/default`, `config/{ENVIRONMENT}`, `config/local`,
    /// then `SWITCHYARD__SECTION__KEY` environment variables
    pub fn new() -> Result<Self> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment_source(None))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Defaults overlaid with one required file and the environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_env(path, None)
    }

    /// Like [`Settings::from_file`] with an explicit variable map in place of
    /// the process environment
    pub fn from_file_with_env(
        path: impl AsRef<Path>,
        variables: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let config = Self::defaults()?
            .add_source(File::from(path.as_ref()).required(true))
            .add_source(environment_source(variables))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let keywords: Vec<String> = destination::DECLARATION_KEYWORDS
            .iter()
            .map(|k| (*k).to_string())
            .collect();

        Ok(Config::builder()
            .set_default("ring_buffer.capacity", ring::DEFAULT_CAPACITY as u64)?
            .set_default("ring_buffer.overflow_policy", "drop_chunk")?
            .set_default(
                "classifier.max_packet_payload",
                packet::DEFAULT_MAX_PAYLOAD as u64,
            )?
            .set_default("classifier.frame_length", frame::DEFAULT_LEN as u64)?
            .set_default("classifier.frame_zero_run", frame::DEFAULT_ZERO_RUN as u64)?
            .set_default(
                "classifier.frame_destination_prefix",
                frame::DEFAULT_DESTINATION_PREFIX,
            )?
            .set_default("classifier.max_line", line::DEFAULT_MAX_LEN as u64)?
            .set_default("classifier.unit_prefix", unit::LINE_PREFIX)?
            .set_default("classifier.sync_marker", line::DEFAULT_SYNC_MARKER)?
            .set_default("classifier.declaration_keywords", keywords)?
            .set_default(
                "classifier.incomplete_timeout_ms",
                worker::DEFAULT_INCOMPLETE_TIMEOUT_MS,
            )?
            .set_default(
                "worker.max_batch_messages",
                worker::DEFAULT_MAX_BATCH as u64,
            )?
            .set_default("worker.idle_wait_ms", worker::DEFAULT_IDLE_WAIT_MS)?
            .set_default("worker.min_pass_interval_ms", 0_u64)?
            .set_default("replay.chunk_size", 256_u64)?
            .set_default("replay.chunk_interval_ms", 0_u64)?
            .set_default("replay.destinations", Vec::<String>::new())?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?)
    }

    pub fn ring_buffer_config(&self) -> Result<RingBufferConfig> {
        let capacity = BufferCapacity::try_new(self.ring_buffer.capacity)
            .map_err(|e| Error::invalid_setting("ring_buffer.capacity", e))?;
        Ok(RingBufferConfig {
            capacity,
            overflow_policy: self.ring_buffer.overflow_policy,
        })
    }

    pub fn classifier_config(&self) -> Result<ClassifierConfig> {
        let c = &self.classifier;
        let frame_length = FrameLength::try_new(c.frame_length)
            .map_err(|e| Error::invalid_setting("classifier.frame_length", e))?;
        let max_line = MaxLineLength::try_new(c.max_line)
            .map_err(|e| Error::invalid_setting("classifier.max_line", e))?;
        if c.unit_prefix.is_empty() {
            return Err(Error::invalid_setting(
                "classifier.unit_prefix",
                "must not be empty",
            ));
        }
        if c.sync_marker.is_empty() || c.sync_marker.contains('\n') {
            return Err(Error::invalid_setting(
                "classifier.sync_marker",
                "must be one non-empty line",
            ));
        }

        Ok(ClassifierConfig {
            max_packet_payload: c.max_packet_payload,
            frame_length,
            frame_zero_run: c.frame_zero_run,
            frame_destination_prefix: c.frame_destination_prefix.clone(),
            max_line,
            unit_prefix: c.unit_prefix.clone(),
            sync_marker: c.sync_marker.clone(),
            declaration_keywords: c.declaration_keywords.clone(),
            incomplete_timeout: Duration::from_millis(c.incomplete_timeout_ms),
        })
    }

    pub fn worker_config(&self) -> Result<WorkerConfig> {
        let max_batch_messages = MaxBatchMessages::try_new(self.worker.max_batch_messages)
            .map_err(|e| Error::invalid_setting("worker.max_batch_messages", e))?;
        if self.worker.idle_wait_ms == 0 {
            return Err(Error::invalid_setting(
                "worker.idle_wait_ms",
                "must be at least 1",
            ));
        }
        Ok(WorkerConfig {
            max_batch_messages,
            idle_wait: Duration::from_millis(self.worker.idle_wait_ms),
            min_pass_interval: Duration::from_millis(self.worker.min_pass_interval_ms),
        })
    }
}

fn environment_source(variables: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .source(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let file = toml_file("");
        let settings = Settings::from_file_with_env(file.path(), no_env()).unwrap();

        assert_eq!(
            settings.classifier_config().unwrap(),
            ClassifierConfig::default()
        );
        assert_eq!(settings.worker_config().unwrap(), WorkerConfig::default());
        assert_eq!(
            settings.ring_buffer_config().unwrap(),
            RingBufferConfig::default()
        );
        assert_eq!(settings.logging.format, "pretty");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = toml_file(
            r#"
[ring_buffer]
capacity = 4096
overflow_policy = "resync"

[classifier]
frame_length = 32
declaration_keywords = ["TERM", "PLOT"]

[replay]
chunk_size = 17
destinations = ["MyTerm"]
"#,
        );
        let settings = Settings::from_file_with_env(file.path(), no_env()).unwrap();

        let ring = settings.ring_buffer_config().unwrap();
        assert_eq!(ring.capacity.into_inner(), 4096);
        assert_eq!(ring.overflow_policy, OverflowPolicy::Resync);

        let classifier = settings.classifier_config().unwrap();
        assert_eq!(classifier.frame_length.into_inner(), 32);
        assert_eq!(classifier.declaration_keywords, vec!["TERM", "PLOT"]);
        assert_eq!(settings.replay.chunk_size, 17);
        assert_eq!(settings.replay.destinations, vec!["MyTerm"]);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = toml_file("[worker]\nidle_wait_ms = 50\n");
        let variables = HashMap::from([
            ("SWITCHYARD__WORKER__IDLE_WAIT_MS".to_string(), "5".to_string()),
            ("SWITCHYARD__LOGGING__FORMAT".to_string(), "json".to_string()),
        ]);
        let settings = Settings::from_file_with_env(file.path(), Some(variables)).unwrap();

        assert_eq!(settings.worker.idle_wait_ms, 5);
        assert_eq!(settings.logging.format, "json");
    }

    #[test]
    fn test_out_of_range_values_name_the_setting() {
        let file = toml_file("[ring_buffer]\ncapacity = 8\n[worker]\nmax_batch_messages = 0\n");
        let settings = Settings::from_file_with_env(file.path(), no_env()).unwrap();

        let error = settings.ring_buffer_config().unwrap_err();
        assert!(
            matches!(&error, Error::InvalidSetting { key, .. } if key == "ring_buffer.capacity")
        );
        let error = settings.worker_config().unwrap_err();
        assert!(
            matches!(&error, Error::InvalidSetting { key, .. } if key == "worker.max_batch_messages")
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Settings::from_file_with_env("/nonexistent/switchyard.toml", no_env());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
