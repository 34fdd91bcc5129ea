//! Persistent CLI configuration
//!
//! Settings live in `<config dir>/bloodhound.config.json` as a flat JSON
//! object with lowercase, dot-delimited keys. A lookup resolves in this
//! order: environment variable, file value, registered default. Aliases
//! redirect a short name to a canonical key at lookup time and are never
//! written to disk.
//!
//! Loading always rewrites the file with the merged result, so a file from
//! an older release picks up newly introduced defaults on the next run.

use anyhow::{bail, Context, Result};
use bloodhound_core::Paths;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_DIRECTORY_KEY: &str = "config_directory";
pub const PRINCIPAL_NAME_KEY: &str = "default_admin.principal_name";
pub const PASSWORD_KEY: &str = "default_admin.bh_default_admin_password";
pub const PASSWORD_ALIAS: &str = "default_password";
pub const ROOT_URL_KEY: &str = "root_url";

/// Length of generated admin credentials
pub const PASSWORD_LENGTH: usize = 32;

/// Minimum permission bits on the config directory: owner read + write
const MIN_DIR_MODE: u32 = 0o600;

const PASSWORD_SYMBOLS: &[u8] = b"!@#%^&*-_=+";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config variable `{0}` not found")]
    NotFound(String),

    #[error("`{0}` cannot be changed with `config set`. Use the --file flag to point the container commands at a different YAML file")]
    Protected(String),

    #[error("Config keys cannot be empty")]
    EmptyKey,

    #[error("The config directory {path} must allow at least read and write access for its owner (current mode {mode:o})")]
    InsufficientPermissions { path: PathBuf, mode: u32 },

    #[error("Error while parsing the JSON config file {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Config value for `{0}` must be a string, boolean, or number")]
    UnsupportedValue(String),
}

/// A single configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    /// Any JSON number, integer or not
    Number(Number),
    Str(String),
}

impl ConfigValue {
    /// Interpret a literal typed by the operator
    ///
    /// Only `true` and `false` (any case) become booleans. Everything else,
    /// numbers included, is kept verbatim as a string.
    pub fn from_literal(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            Self::Bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Self::Bool(false)
        } else {
            Self::Str(raw.to_string())
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Self::Str(s) if s.is_empty())
    }

    fn from_json(key: &str, value: &Value) -> Result<Option<Self>> {
        let value = match value {
            Value::Null => return Ok(None),
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::Str(s.clone()),
            Value::Array(_) | Value::Object(_) => {
                bail!(ConfigError::UnsupportedValue(key.to_string()))
            }
        };
        Ok(Some(value))
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A key with its resolved value, as returned by [`ConfigStore::get`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: ConfigValue,
}

/// File-backed key/value settings with defaults, aliases, and env overrides
#[derive(Debug)]
pub struct ConfigStore {
    dir: PathBuf,
    path: PathBuf,
    defaults: BTreeMap<String, ConfigValue>,
    values: BTreeMap<String, ConfigValue>,
    aliases: BTreeMap<String, String>,
    env: BTreeMap<String, String>,
}

impl ConfigStore {
    /// Create an empty store rooted at `dir`, snapshotting the process env
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            path: Paths::with_config_dir(&dir).config_file(),
            dir,
            defaults: BTreeMap::new(),
            values: BTreeMap::new(),
            aliases: BTreeMap::new(),
            env: std::env::vars().collect(),
        }
    }

    /// Replace the environment snapshot used for overrides
    pub fn with_env<I>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env = env.into_iter().collect();
        self
    }

    /// Register defaults and load the file in `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(dir);
        store.register_defaults();
        store.load()?;
        Ok(store)
    }

    /// Register the default settings for a basic deployment
    ///
    /// A fresh admin credential is generated every time; it only sticks once
    /// [`load`](Self::load) writes it to a file that did not have one.
    pub fn register_defaults(&mut self) {
        self.set_default(PRINCIPAL_NAME_KEY, "admin");
        self.set_default(PASSWORD_KEY, generate_password(PASSWORD_LENGTH, true).as_str());

        self.set_default("bind_addr", "0.0.0.0:8080");
        self.set_default("metrics_port", ":2112");
        self.set_default(ROOT_URL_KEY, "http://127.0.0.1:8080/");
        self.set_default("work_dir", "/opt/bloodhound/work");
        self.set_default("log_level", "INFO");
        self.set_default("log_path", "bloodhound.log");
        self.set_default("collectors_base_path", "/etc/bloodhound/collectors");

        self.set_default("tls.cert_file", "");
        self.set_default("tls.key_file", "");

        let dir = self.dir.to_string_lossy().into_owned();
        self.set_default(CONFIG_DIRECTORY_KEY, dir.as_str());

        self.register_alias(PASSWORD_ALIAS, PASSWORD_KEY);
    }

    pub fn set_default(&mut self, key: &str, value: impl Into<ConfigValue>) {
        self.defaults.insert(key.to_lowercase(), value.into());
    }

    pub fn register_alias(&mut self, alias: &str, key: &str) {
        self.aliases.insert(alias.to_lowercase(), key.to_lowercase());
    }

    /// Read the JSON file over the defaults and write the merged result back
    pub fn load(&mut self) -> Result<()> {
        if self.dir.is_dir() {
            check_dir_permissions(&self.dir)?;
        } else {
            info!(dir = %self.dir.display(), "config directory is missing, creating it");
            fs::create_dir_all(&self.dir).with_context(|| {
                format!("Failed to create the config directory {}", self.dir.display())
            })?;
        }

        if !self.path.exists() {
            fs::write(&self.path, "{}\n").with_context(|| {
                format!(
                    "The JSON config file {} doesn't exist and couldn't be created",
                    self.path.display()
                )
            })?;
        }

        for (key, value) in self.read_file()? {
            let key = self.resolve(&key);
            self.values.insert(key, value);
        }

        self.persist()
    }

    /// Write defaults merged with stored values to the JSON file
    ///
    /// Environment overrides are not written.
    pub fn persist(&self) -> Result<()> {
        let mut content = serde_json::to_string_pretty(&self.merged())?;
        content.push('\n');
        fs::write(&self.path, content).with_context(|| {
            format!("Error while writing the JSON config file {}", self.path.display())
        })?;
        debug!(path = %self.path.display(), "config persisted");
        Ok(())
    }

    /// All effective settings as indented JSON
    pub fn get_all(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.effective())?)
    }

    /// Look up several keys, sorted by key name
    ///
    /// Any key without a value (an empty string counts as no value) fails the
    /// whole lookup.
    pub fn get<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<ConfigEntry>> {
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref().to_lowercase();
            match self.lookup(&self.resolve(&key)) {
                Some(value) if !value.is_blank() => entries.push(ConfigEntry { key, value }),
                _ => bail!(ConfigError::NotFound(key)),
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Effective value for a key, if any
    pub fn value(&self, key: &str) -> Option<ConfigValue> {
        self.lookup(&self.resolve(key))
    }

    /// Effective value rendered as a string, empty when unset
    pub fn get_string(&self, key: &str) -> String {
        self.value(key).map(|v| v.to_string()).unwrap_or_default()
    }

    /// Store a value and persist the file
    pub fn set(&mut self, key: &str, raw: &str) -> Result<ConfigEntry> {
        if key.trim().is_empty() {
            bail!(ConfigError::EmptyKey);
        }
        let key = self.resolve(key);
        if key == CONFIG_DIRECTORY_KEY {
            bail!(ConfigError::Protected(key));
        }

        let value = ConfigValue::from_literal(raw);
        self.values.insert(key.clone(), value.clone());
        self.persist()?;
        Ok(ConfigEntry { key, value })
    }

    /// Replace the admin credential with a freshly generated one and persist
    pub fn regenerate_password(&mut self) -> Result<String> {
        let password = generate_password(PASSWORD_LENGTH, true);
        self.values
            .insert(PASSWORD_KEY.to_string(), ConfigValue::Str(password.clone()));
        self.persist()?;
        Ok(password)
    }

    /// Effective settings as upper-cased environment variables
    pub fn env_exports(&self) -> Vec<(String, String)> {
        self.effective()
            .into_iter()
            .map(|(key, value)| (env_var_name(&key), value.to_string()))
            .collect()
    }

    /// Directory holding the config file and the service-definition files
    pub fn config_dir(&self) -> PathBuf {
        match self.value(CONFIG_DIRECTORY_KEY) {
            Some(value) if !value.is_blank() => PathBuf::from(value.to_string()),
            _ => self.dir.clone(),
        }
    }

    /// Path of the backing JSON file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, key: &str) -> String {
        let key = key.to_lowercase();
        self.aliases.get(&key).cloned().unwrap_or(key)
    }

    fn lookup(&self, key: &str) -> Option<ConfigValue> {
        // An empty variable is treated as unset
        let raw = self.env.get(&env_var_name(key)).filter(|raw| !raw.is_empty());
        if let Some(raw) = raw {
            return Some(ConfigValue::from_literal(raw));
        }
        self.values
            .get(key)
            .or_else(|| self.defaults.get(key))
            .cloned()
    }

    fn merged(&self) -> BTreeMap<String, ConfigValue> {
        let mut merged = self.defaults.clone();
        merged.extend(self.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    fn effective(&self) -> BTreeMap<String, ConfigValue> {
        self.merged()
            .into_keys()
            .filter_map(|key| self.lookup(&key).map(|value| (key, value)))
            .collect()
    }

    fn read_file(&self) -> Result<BTreeMap<String, ConfigValue>> {
        let content = fs::read_to_string(&self.path).with_context(|| {
            format!("Error while reading the JSON config file {}", self.path.display())
        })?;

        let mut values = BTreeMap::new();
        if content.trim().is_empty() {
            return Ok(values);
        }

        let root: Value = serde_json::from_str(&content).map_err(|e| ConfigError::Malformed {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let Value::Object(object) = root else {
            bail!(ConfigError::Malformed {
                path: self.path.clone(),
                message: "expected a JSON object".to_string(),
            });
        };

        flatten_into(None, &object, &mut values)?;
        Ok(values)
    }
}

/// Environment variable consulted for `key`: `tls.cert_file` -> `TLS_CERT_FILE`
pub fn env_var_name(key: &str) -> String {
    key.replace('.', "_").to_uppercase()
}

/// Generate a random credential of `length` characters
pub fn generate_password(length: usize, include_symbols: bool) -> String {
    let mut charset: Vec<u8> = (b'a'..=b'z')
        .chain(b'A'..=b'Z')
        .chain(b'0'..=b'9')
        .collect();
    if include_symbols {
        charset.extend_from_slice(PASSWORD_SYMBOLS);
    }

    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

// Older releases wrote nested objects; fold them into dotted keys.
fn flatten_into(
    prefix: Option<&str>,
    object: &Map<String, Value>,
    out: &mut BTreeMap<String, ConfigValue>,
) -> Result<()> {
    for (key, value) in object {
        let key = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        }
        .to_lowercase();

        if let Value::Object(nested) = value {
            flatten_into(Some(&key), nested, out)?;
        } else if let Some(value) = ConfigValue::from_json(&key, value)? {
            out.insert(key, value);
        }
    }
    Ok(())
}

#[cfg(unix)]
fn check_dir_permissions(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(dir)
        .with_context(|| format!("Failed to inspect the config directory {}", dir.display()))?
        .permissions()
        .mode()
        & 0o777;
    if mode & MIN_DIR_MODE != MIN_DIR_MODE {
        bail!(ConfigError::InsufficientPermissions {
            path: dir.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_dir_permissions(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloodhound_core::paths::CONFIG_FILE_NAME;
    use tempfile::TempDir;

    fn isolated(dir: &Path) -> ConfigStore {
        ConfigStore::new(dir).with_env(Vec::new())
    }

    fn open_isolated(dir: &Path) -> Result<ConfigStore> {
        let mut store = isolated(dir);
        store.register_defaults();
        store.load()?;
        Ok(store)
    }

    fn read_json(path: &Path) -> Result<Map<String, Value>> {
        let content = fs::read_to_string(path)?;
        match serde_json::from_str(&content)? {
            Value::Object(object) => Ok(object),
            other => panic!("expected an object, got {}", other),
        }
    }

    #[test]
    fn test_fresh_directory_gets_every_default() -> Result<()> {
        let tmp = TempDir::new()?;
        let dir = tmp.path().join("bloodhound");
        let store = open_isolated(&dir)?;

        assert!(store.path().is_file());
        let file = read_json(store.path())?;
        assert_eq!(store.defaults.len(), 12);
        assert_eq!(file.len(), store.defaults.len());
        assert_eq!(file["bind_addr"], Value::from("0.0.0.0:8080"));
        assert_eq!(file[CONFIG_DIRECTORY_KEY], Value::from(dir.to_string_lossy().into_owned()));
        assert!(!file.contains_key(PASSWORD_ALIAS));
        Ok(())
    }

    #[test]
    fn test_defaults_without_set() -> Result<()> {
        let tmp = TempDir::new()?;
        let store = open_isolated(tmp.path())?;

        let entries = store.get(&["default_admin.principal_name"])?;
        assert_eq!(
            entries,
            vec![ConfigEntry {
                key: "default_admin.principal_name".to_string(),
                value: ConfigValue::from("admin"),
            }]
        );
        assert_eq!(store.get_string("metrics_port"), ":2112");
        assert_eq!(store.get_string("log_level"), "INFO");
        Ok(())
    }

    #[test]
    fn test_get_sorts_and_ignores_case() -> Result<()> {
        let tmp = TempDir::new()?;
        let store = open_isolated(tmp.path())?;

        let entries = store.get(&["COLLECTORS_BASE_PATH", "Bind_Addr"])?;
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["bind_addr", "collectors_base_path"]);
        assert_eq!(entries[1].value, ConfigValue::from("/etc/bloodhound/collectors"));
        Ok(())
    }

    #[test]
    fn test_get_unknown_or_empty_key_fails() -> Result<()> {
        let tmp = TempDir::new()?;
        let store = open_isolated(tmp.path())?;

        let err = store.get(&["bind_addr", "no_such_key"]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NotFound(key)) if key == "no_such_key"
        ));

        let err = store.get(&["tls.cert_file"]).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_alias_resolves_to_generated_password() -> Result<()> {
        let tmp = TempDir::new()?;
        let store = open_isolated(tmp.path())?;

        let password = store.get_string(PASSWORD_KEY);
        assert_eq!(password.len(), PASSWORD_LENGTH);

        let entries = store.get(&["DEFAULT_PASSWORD"])?;
        assert_eq!(entries[0].key, "default_password");
        assert_eq!(entries[0].value, ConfigValue::Str(password));
        Ok(())
    }

    #[test]
    fn test_set_coerces_booleans_only() -> Result<()> {
        let tmp = TempDir::new()?;
        let mut store = open_isolated(tmp.path())?;

        store.set("feature.enabled", "TRUE")?;
        store.set("feature.disabled", "false")?;
        store.set("metrics_port", "2113")?;

        assert_eq!(store.value("feature.enabled"), Some(ConfigValue::Bool(true)));
        assert_eq!(store.value("feature.disabled"), Some(ConfigValue::Bool(false)));
        assert_eq!(store.value("metrics_port"), Some(ConfigValue::from("2113")));

        let enabled = store.set("feature.enabled", "yes")?;
        assert_eq!(enabled.value.as_bool(), None);
        assert_eq!(enabled.value, ConfigValue::from("yes"));
        assert_eq!(store.value("feature.disabled").and_then(|v| v.as_bool()), Some(false));
        Ok(())
    }

    #[test]
    fn test_set_survives_reload() -> Result<()> {
        let tmp = TempDir::new()?;
        let mut store = open_isolated(tmp.path())?;
        store.set("log_path", "bhce.log")?;
        store.set("Default_Password", "hunter2")?;
        store.set("tls.enabled", "true")?;
        let password = store.get_string(PASSWORD_KEY);

        let reloaded = open_isolated(tmp.path())?;
        assert_eq!(reloaded.get_string("log_path"), "bhce.log");
        assert_eq!(reloaded.get_string(PASSWORD_KEY), "hunter2");
        assert_eq!(reloaded.get_string(PASSWORD_KEY), password);
        assert_eq!(reloaded.value("tls.enabled"), Some(ConfigValue::Bool(true)));
        Ok(())
    }

    #[test]
    fn test_config_directory_is_protected() -> Result<()> {
        let tmp = TempDir::new()?;
        let mut store = open_isolated(tmp.path())?;
        let before = fs::read_to_string(store.path())?;

        let err = store.set("CONFIG_DIRECTORY", "/somewhere/else").unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::Protected(_))));
        assert_eq!(store.config_dir(), tmp.path());
        assert_eq!(fs::read_to_string(store.path())?, before);
        Ok(())
    }

    #[test]
    fn test_env_overrides_reads_but_not_file() -> Result<()> {
        let tmp = TempDir::new()?;
        let mut store = isolated(tmp.path()).with_env(vec![
            ("BIND_ADDR".to_string(), "127.0.0.1:9090".to_string()),
            ("DEFAULT_ADMIN_PRINCIPAL_NAME".to_string(), "operator".to_string()),
        ]);
        store.register_defaults();
        store.load()?;

        assert_eq!(store.get_string("bind_addr"), "127.0.0.1:9090");
        assert_eq!(store.get(&[PRINCIPAL_NAME_KEY])?[0].value, ConfigValue::from("operator"));

        let file = read_json(store.path())?;
        assert_eq!(file["bind_addr"], Value::from("0.0.0.0:8080"));

        let shown: Value = serde_json::from_str(&store.get_all()?)?;
        assert_eq!(shown["bind_addr"], Value::from("127.0.0.1:9090"));
        Ok(())
    }

    #[test]
    fn test_file_values_win_over_defaults() -> Result<()> {
        let tmp = TempDir::new()?;
        fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            r#"{"bind_addr": "10.0.0.5:8080", "retries": 3, "Extra.Key": "kept"}"#,
        )?;
        let store = open_isolated(tmp.path())?;

        assert_eq!(store.get_string("bind_addr"), "10.0.0.5:8080");
        assert_eq!(store.value("retries"), Some(ConfigValue::Number(Number::from(3))));
        assert_eq!(store.get_string("extra.key"), "kept");

        let file = read_json(store.path())?;
        assert_eq!(file["retries"], Value::from(3));
        assert_eq!(file["root_url"], Value::from("http://127.0.0.1:8080/"));
        Ok(())
    }

    #[test]
    fn test_fractional_numbers_stay_numbers() -> Result<()> {
        let tmp = TempDir::new()?;
        fs::write(tmp.path().join(CONFIG_FILE_NAME), r#"{"ratio": 1.5}"#)?;
        let store = open_isolated(tmp.path())?;

        assert_eq!(store.get_string("ratio"), "1.5");
        let file = read_json(store.path())?;
        assert_eq!(file["ratio"], Value::from(1.5));
        Ok(())
    }

    #[test]
    fn test_empty_env_var_does_not_override() -> Result<()> {
        let tmp = TempDir::new()?;
        fs::write(tmp.path().join(CONFIG_FILE_NAME), r#"{"bind_addr": "10.0.0.5:8080"}"#)?;
        let mut store = isolated(tmp.path()).with_env(vec![
            ("BIND_ADDR".to_string(), String::new()),
            ("ROOT_URL".to_string(), String::new()),
        ]);
        store.register_defaults();
        store.load()?;

        assert_eq!(store.get(&["bind_addr"])?[0].value, ConfigValue::from("10.0.0.5:8080"));
        assert_eq!(store.get_string("root_url"), "http://127.0.0.1:8080/");

        let shown: Value = serde_json::from_str(&store.get_all()?)?;
        assert_eq!(shown["bind_addr"], Value::from("10.0.0.5:8080"));

        let exports = store.env_exports();
        let bind = exports.iter().find(|(name, _)| name == "BIND_ADDR").map(|(_, v)| v.as_str());
        assert_eq!(bind, Some("10.0.0.5:8080"));
        Ok(())
    }

    #[test]
    fn test_nested_legacy_file_is_flattened() -> Result<()> {
        let tmp = TempDir::new()?;
        fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            r#"{"default_admin": {"principal_name": "legacy", "bh_default_admin_password": "old-secret"},
                "default_password": "folded-into-canonical-key"}"#,
        )?;
        let store = open_isolated(tmp.path())?;

        assert_eq!(store.get_string(PRINCIPAL_NAME_KEY), "legacy");
        let file = read_json(store.path())?;
        assert!(!file.contains_key("default_admin"));
        assert!(!file.contains_key(PASSWORD_ALIAS));
        assert_eq!(file[PRINCIPAL_NAME_KEY], Value::from("legacy"));
        assert!(file.contains_key(PASSWORD_KEY));
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_rejected() -> Result<()> {
        let tmp = TempDir::new()?;
        fs::write(tmp.path().join(CONFIG_FILE_NAME), "[1, 2, 3]")?;

        let err = open_isolated(tmp.path()).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::Malformed { .. })));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_insufficient_permissions_halt_before_writing() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new()?;
        let dir = tmp.path().join("locked");
        fs::create_dir(&dir)?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o500))?;

        let result = open_isolated(&dir);
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InsufficientPermissions { mode: 0o500, .. })
        ));
        assert!(!dir.join(CONFIG_FILE_NAME).exists());
        Ok(())
    }

    #[test]
    fn test_regenerate_password_persists() -> Result<()> {
        let tmp = TempDir::new()?;
        let mut store = open_isolated(tmp.path())?;
        let old = store.get_string(PASSWORD_ALIAS);

        let new = store.regenerate_password()?;
        assert_ne!(old, new);
        assert_eq!(open_isolated(tmp.path())?.get_string(PASSWORD_ALIAS), new);
        Ok(())
    }

    #[test]
    fn test_env_exports_use_upper_snake_case() -> Result<()> {
        let tmp = TempDir::new()?;
        let store = open_isolated(tmp.path())?;
        let exports: BTreeMap<String, String> = store.env_exports().into_iter().collect();

        assert_eq!(exports["BIND_ADDR"], "0.0.0.0:8080");
        assert_eq!(exports["DEFAULT_ADMIN_PRINCIPAL_NAME"], "admin");
        assert_eq!(exports["TLS_CERT_FILE"], "");
        assert_eq!(env_var_name("tls.key_file"), "TLS_KEY_FILE");
        Ok(())
    }

    #[test]
    fn test_generate_password_charset() {
        let plain = generate_password(64, false);
        assert_eq!(plain.len(), 64);
        assert!(plain.chars().all(|c| c.is_ascii_alphanumeric()));

        let symbols = generate_password(16, true);
        assert_eq!(symbols.chars().count(), 16);
        assert!(symbols.bytes().all(|b| b.is_ascii_alphanumeric() || PASSWORD_SYMBOLS.contains(&b)));
    }
}
