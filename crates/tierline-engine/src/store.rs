//! Persistence seams
//!
//! The engine works on in-memory snapshots. Loading and saving them, and
//! doing something with generated DDL, goes through the traits here.
//! Documents are always replaced whole.

use std::path::{Path, PathBuf};

use tierline_core::{EnvironmentError, Layer, Metric, MetricRecord, SchemaDictionary};
use tierline_schema::ddl::fingerprint;
use tierline_schema::LayerDdl;

/// Loads and saves the schema dictionary
pub trait DictionaryStore {
    /// `Ok(None)` when no dictionary has been saved yet
    fn load(&self) -> Result<Option<SchemaDictionary>, EnvironmentError>;

    fn save(&self, dictionary: &SchemaDictionary) -> Result<(), EnvironmentError>;
}

/// Loads and saves custom (non built-in) metrics
pub trait MetricStore {
    fn load(&self) -> Result<Vec<Metric>, EnvironmentError>;

    fn save(&self, metrics: &[&Metric]) -> Result<(), EnvironmentError>;
}

/// What a sink did with a layer's DDL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Written,
    Unchanged,
}

/// Destination for generated DDL
pub trait DdlSink {
    fn name(&self) -> &'static str;

    fn apply(&self, ddl: &LayerDdl) -> Result<SinkStatus, EnvironmentError>;
}

fn io_error(path: &Path, error: std::io::Error) -> EnvironmentError {
    EnvironmentError::Io {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}

fn decode_error(path: &Path, message: impl ToString) -> EnvironmentError {
    EnvironmentError::Decode {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Write `contents` next to `path` and rename over it
fn replace_file(path: &Path, contents: &str) -> Result<(), EnvironmentError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let staging = path.with_extension("tmp");
    std::fs::write(&staging, contents).map_err(|e| io_error(&staging, e))?;
    std::fs::rename(&staging, path).map_err(|e| io_error(path, e))
}

fn read_optional(path: &Path) -> Result<Option<String>, EnvironmentError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Dictionary kept as one JSON document
#[derive(Debug, Clone)]
pub struct JsonDictionaryStore {
    path: PathBuf,
}

impl JsonDictionaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DictionaryStore for JsonDictionaryStore {
    fn load(&self) -> Result<Option<SchemaDictionary>, EnvironmentError> {
        let Some(contents) = read_optional(&self.path)? else {
            return Ok(None);
        };
        let dictionary = serde_json::from_str(&contents).map_err(|e| decode_error(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), "loaded dictionary");
        Ok(Some(dictionary))
    }

    fn save(&self, dictionary: &SchemaDictionary) -> Result<(), EnvironmentError> {
        let json = serde_json::to_string_pretty(dictionary).map_err(|e| decode_error(&self.path, e))?;
        replace_file(&self.path, &json)
    }
}

/// Custom metrics kept as a JSON array of metric records
#[derive(Debug, Clone)]
pub struct JsonMetricStore {
    path: PathBuf,
}

impl JsonMetricStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricStore for JsonMetricStore {
    /// A stored record that fails validation fails the whole load
    fn load(&self) -> Result<Vec<Metric>, EnvironmentError> {
        let Some(contents) = read_optional(&self.path)? else {
            return Ok(Vec::new());
        };
        let records: Vec<MetricRecord> = serde_json::from_str(&contents).map_err(|e| decode_error(&self.path, e))?;

        records
            .into_iter()
            .map(|record| {
                let id = record.id.clone();
                Metric::try_from(record).map_err(|e| decode_error(&self.path, format!("metric '{}': {}", id, e)))
            })
            .collect()
    }

    fn save(&self, metrics: &[&Metric]) -> Result<(), EnvironmentError> {
        let records: Vec<MetricRecord> = metrics.iter().map(|m| MetricRecord::from((*m).clone())).collect();
        let json = serde_json::to_string_pretty(&records).map_err(|e| decode_error(&self.path, e))?;
        replace_file(&self.path, &json)
    }
}

/// Writes one `<layer>.sql` file per layer, skipping unchanged content
#[derive(Debug, Clone)]
pub struct DirectoryDdlSink {
    dir: PathBuf,
}

impl DirectoryDdlSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, layer: Layer) -> PathBuf {
        self.dir.join(format!("{}.sql", layer.as_str().to_lowercase()))
    }
}

impl DdlSink for DirectoryDdlSink {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn apply(&self, ddl: &LayerDdl) -> Result<SinkStatus, EnvironmentError> {
        let path = self.path_for(ddl.layer);

        if let Some(existing) = read_optional(&path)? {
            if fingerprint(&existing) == ddl.fingerprint {
                tracing::debug!(path = %path.display(), "DDL unchanged");
                return Ok(SinkStatus::Unchanged);
            }
        }

        replace_file(&path, &ddl.sql)?;
        tracing::info!(path = %path.display(), layer = %ddl.layer, "wrote DDL");
        Ok(SinkStatus::Written)
    }
}

/// Executes DDL against the database named by an environment variable
///
/// This build carries no database driver, so execution reports which piece
/// of the environment is missing instead of connecting.
#[derive(Debug, Clone)]
pub struct DatabaseDdlSink {
    url_env: String,
}

impl DatabaseDdlSink {
    pub fn new(url_env: impl Into<String>) -> Self {
        Self { url_env: url_env.into() }
    }

    fn database_url(&self) -> Result<String, EnvironmentError> {
        std::env::var(&self.url_env)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| EnvironmentError::MissingConfiguration {
                what: format!("database URL (environment variable {})", self.url_env),
                hint: format!(
                    "export {} or add it to .env, or set [database].url_env in tierline.toml",
                    self.url_env
                ),
            })
    }
}

impl DdlSink for DatabaseDdlSink {
    fn name(&self) -> &'static str {
        "database"
    }

    fn apply(&self, ddl: &LayerDdl) -> Result<SinkStatus, EnvironmentError> {
        let url = self.database_url()?;
        let driver = url.split("://").next().unwrap_or("unknown").to_string();

        tracing::warn!(layer = %ddl.layer, driver = %driver, "no database driver available");
        Err(EnvironmentError::MissingDriver {
            driver,
            hint: "run `tierline ddl` without --execute and apply the per-layer .sql files with your database client"
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tierline_core::{Field, MetricBuilder, SourceField, Table};
    use tierline_schema::DdlGenerator;

    fn dictionary() -> SchemaDictionary {
        let mut dict = SchemaDictionary::new();
        dict.add_table(Table::new("facility", Layer::L1, "ref", vec![Field::new("facility_id").primary_key()]).unwrap())
            .unwrap();
        dict
    }

    #[test]
    fn dictionary_round_trips_through_json_file() {
        let temp = TempDir::new().unwrap();
        let store = JsonDictionaryStore::new(temp.path().join("nested/dictionary.json"));

        assert!(store.load().unwrap().is_none());
        store.save(&dictionary()).unwrap();
        assert_eq!(store.load().unwrap(), Some(dictionary()));
    }

    #[test]
    fn malformed_dictionary_is_a_decode_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dictionary.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonDictionaryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, EnvironmentError::Decode { .. }));
    }

    #[test]
    fn metric_store_persists_records() {
        let temp = TempDir::new().unwrap();
        let store = JsonMetricStore::new(temp.path().join("metrics.json"));
        let metric = MetricBuilder::new("EXP-001", "Drawn")
            .formula("SUM(drawn_amount)")
            .source_field(SourceField::new(Layer::L2, "facility_exposure_snapshot", "drawn_amount").unwrap())
            .build()
            .unwrap();

        store.save(&[&metric]).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![metric]);
    }

    #[test]
    fn directory_sink_skips_unchanged_layers() {
        let temp = TempDir::new().unwrap();
        let sink = DirectoryDdlSink::new(temp.path());
        let ddl = DdlGenerator::default().layer_ddl(&dictionary(), Layer::L1);

        assert_eq!(sink.apply(&ddl).unwrap(), SinkStatus::Written);
        assert_eq!(sink.apply(&ddl).unwrap(), SinkStatus::Unchanged);
        assert_eq!(std::fs::read_to_string(sink.path_for(Layer::L1)).unwrap(), ddl.sql);
    }

    #[test]
    fn database_sink_reports_missing_url() {
        let sink = DatabaseDdlSink::new("TIERLINE_TEST_URL_THAT_IS_NEVER_SET");
        let ddl = DdlGenerator::default().layer_ddl(&dictionary(), Layer::L1);

        let err = sink.apply(&ddl).unwrap_err();
        assert!(matches!(err, EnvironmentError::MissingConfiguration { .. }));
        assert!(err.hint().contains("TIERLINE_TEST_URL_THAT_IS_NEVER_SET"));
    }
}
