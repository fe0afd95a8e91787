// File-backed host alias registry with cross-process write locking.
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::config_paths::{default_config_dir, registry_path, validate_alias};
use crate::core::error::{EntityKind, Error, ErrorKind};

const FORMAT_VERSION: u64 = 1;

/// A named endpoint plus the credentials used to administer it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEntry {
    pub alias: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredHost {
    url: String,
    access_key: String,
    secret_key: String,
}

#[derive(Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default = "format_version")]
    version: u64,
    #[serde(default)]
    hosts: Map<String, Value>,
}

fn format_version() -> u64 {
    FORMAT_VERSION
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            hosts: Map::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HostRegistry {
    path: PathBuf,
}

impl HostRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(config_dir: impl AsRef<Path>) -> Self {
        Self::new(registry_path(config_dir.as_ref()))
    }

    pub fn open_default() -> Self {
        Self::in_dir(default_config_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers `alias`, overwriting any previous entry with the same name.
    pub fn add(&self, alias: &str, url: &str, access_key: &str, secret_key: &str) -> Result<(), Error> {
        validate_alias(alias).map_err(|err| {
            Error::new(ErrorKind::Registry)
                .with_message(err.message())
                .with_entity(EntityKind::Host, alias)
        })?;
        ensure_endpoint_url(url).map_err(|err| err.with_entity(EntityKind::Host, alias))?;

        let stored = StoredHost {
            url: url.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        };
        let value = serde_json::to_value(&stored).map_err(|err| {
            Error::new(ErrorKind::Registry)
                .with_message("failed to encode host entry")
                .with_source(err)
        })?;

        self.update(|doc| {
            doc.hosts.insert(alias.to_string(), value);
            true
        })?;
        tracing::debug!(alias, url, path = %self.path.display(), "registered host");
        Ok(())
    }

    /// Removes `alias`; absent aliases are not an error.
    pub fn remove(&self, alias: &str) -> Result<(), Error> {
        if !self.path.exists() {
            return Ok(());
        }
        let removed = self.update(|doc| doc.hosts.remove(alias).is_some())?;
        if removed {
            tracing::debug!(alias, path = %self.path.display(), "removed host");
        }
        Ok(())
    }

    pub fn list(&self) -> Result<BTreeMap<String, HostEntry>, Error> {
        let doc = self.load()?;
        let mut hosts = BTreeMap::new();
        for (alias, value) in doc.hosts {
            match serde_json::from_value::<StoredHost>(value) {
                Ok(stored) => {
                    hosts.insert(alias.clone(), entry_from_stored(alias, stored));
                }
                Err(err) => {
                    tracing::warn!(
                        alias,
                        path = %self.path.display(),
                        error = %err,
                        "skipping malformed host entry"
                    );
                }
            }
        }
        Ok(hosts)
    }

    pub fn get(&self, alias: &str) -> Result<HostEntry, Error> {
        self.list()?.remove(alias).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("host alias is not registered")
                .with_entity(EntityKind::Host, alias)
                .with_hint("Register it with `objadm config host add <alias> <url> <access-key> <secret-key>`.")
        })
    }

    fn load(&self) -> Result<RegistryDocument, Error> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(RegistryDocument::default());
            }
            Err(err) => {
                return Err(Error::new(ErrorKind::Registry)
                    .with_message("failed to read host registry")
                    .with_path(&self.path)
                    .with_source(err));
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(RegistryDocument::default());
        }
        serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Registry)
                .with_message("host registry is not a valid registry document")
                .with_path(&self.path)
                .with_source(err)
        })
    }

    // Entries this call does not touch are written back exactly as loaded.
    fn update<F>(&self, mutate: F) -> Result<bool, Error>
    where
        F: FnOnce(&mut RegistryDocument) -> bool,
    {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                Error::new(ErrorKind::Registry)
                    .with_message("failed to create config directory")
                    .with_path(parent)
                    .with_source(err)
            })?;
        }

        let _lock = RegistryLock::acquire(&lock_path(&self.path))?;
        let mut doc = self.load()?;
        if !mutate(&mut doc) {
            return Ok(false);
        }
        doc.version = FORMAT_VERSION;
        self.store(&doc)?;
        Ok(true)
    }

    fn store(&self, doc: &RegistryDocument) -> Result<(), Error> {
        let mut payload = serde_json::to_vec_pretty(doc).map_err(|err| {
            Error::new(ErrorKind::Registry)
                .with_message("failed to encode host registry")
                .with_source(err)
        })?;
        payload.push(b'\n');

        let tmp_path = sibling_path(&self.path, ".tmp");
        let write_err = |err: io::Error| {
            Error::new(ErrorKind::Registry)
                .with_message("failed to write host registry")
                .with_path(&tmp_path)
                .with_source(err)
        };
        let mut file = private_file_options().open(&tmp_path).map_err(write_err)?;
        file.write_all(&payload).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|err| {
            let _ = fs::remove_file(&tmp_path);
            Error::new(ErrorKind::Registry)
                .with_message("failed to replace host registry")
                .with_path(&self.path)
                .with_source(err)
        })
    }
}

struct RegistryLock {
    file: File,
}

impl RegistryLock {
    fn acquire(path: &Path) -> Result<Self, Error> {
        let lock_err = |err: io::Error| {
            Error::new(ErrorKind::Registry)
                .with_message("failed to lock host registry")
                .with_path(path)
                .with_source(err)
        };
        let file = private_file_options()
            .truncate(false)
            .open(path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        Ok(Self { file })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn private_file_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

fn lock_path(path: &Path) -> PathBuf {
    sibling_path(path, ".lock")
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

pub(crate) fn ensure_endpoint_url(raw: &str) -> Result<Url, Error> {
    let url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Registry)
            .with_message("invalid endpoint url")
            .with_source(err)
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::new(ErrorKind::Registry)
            .with_message("endpoint url must use http or https scheme"));
    }
    if url.host_str().is_none() {
        return Err(Error::new(ErrorKind::Registry).with_message("endpoint url must include a host"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(Error::new(ErrorKind::Registry).with_message("endpoint url must not include a path"));
    }
    Ok(url)
}

fn entry_from_stored(alias: String, stored: StoredHost) -> HostEntry {
    HostEntry {
        alias,
        url: stored.url,
        access_key: stored.access_key,
        secret_key: stored.secret_key,
    }
}

#[cfg(test)]
mod tests {
    use super::{HostRegistry, ensure_endpoint_url, lock_path};
    use crate::core::error::{EntityKind, ErrorKind};
    use std::path::PathBuf;

    fn registry() -> (tempfile::TempDir, HostRegistry) {
        let temp = tempfile::tempdir().expect("tempdir");
        let registry = HostRegistry::in_dir(temp.path().join("config"));
        (temp, registry)
    }

    #[test]
    fn missing_file_lists_empty() {
        let (_temp, registry) = registry();
        assert!(registry.list().expect("list").is_empty());
    }

    #[test]
    fn add_list_remove_cycle() {
        let (_temp, registry) = registry();
        registry.remove("any_host").expect("remove absent");

        registry
            .add("local", "http://mc_server:9000", "minioadmin", "minioadmin")
            .expect("add");
        let hosts = registry.list().expect("list");
        assert_eq!(hosts.len(), 1);
        let entry = hosts.get("local").expect("entry");
        assert_eq!(entry.alias, "local");
        assert_eq!(entry.url, "http://mc_server:9000");
        assert_eq!(entry.access_key, "minioadmin");
        assert_eq!(entry.secret_key, "minioadmin");

        registry
            .add("local", "http://mc_server:9000", "minioadmin", "rotated")
            .expect("re-add");
        let hosts = registry.list().expect("list");
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts["local"].secret_key, "rotated");

        registry.remove("local").expect("remove");
        assert!(registry.list().expect("list").is_empty());
    }

    #[test]
    fn get_unknown_alias_is_not_found() {
        let (_temp, registry) = registry();
        let err = registry.get("nope").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.entity(), Some((EntityKind::Host, "nope")));
    }

    #[test]
    fn malformed_entries_are_skipped_and_preserved() {
        let (_temp, registry) = registry();
        let path = registry.path().to_path_buf();
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(
            &path,
            r#"{"version":1,"hosts":{"broken":{"url":42},"ok":{"url":"http://a:9000","accessKey":"k","secretKey":"s"}}}"#,
        )
        .expect("write");

        let hosts = registry.list().expect("list");
        assert_eq!(hosts.keys().collect::<Vec<_>>(), vec!["ok"]);

        registry.add("other", "http://b:9000", "k2", "s2").expect("add");
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(raw["hosts"]["broken"]["url"], 42);
        assert_eq!(registry.list().expect("list").len(), 2);
    }

    #[test]
    fn hand_written_file_without_version_loads() {
        let (_temp, registry) = registry();
        let path = registry.path().to_path_buf();
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(
            &path,
            r#"{"hosts":{"ok":{"url":"http://a:9000","accessKey":"k","secretKey":"s"}}}"#,
        )
        .expect("write");

        let hosts = registry.list().expect("list");
        assert_eq!(hosts["ok"].url, "http://a:9000");

        registry.add("other", "http://b:9000", "k2", "s2").expect("add");
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(raw["version"], 1);
    }

    #[test]
    fn non_object_document_is_registry_error() {
        let (_temp, registry) = registry();
        let path = registry.path().to_path_buf();
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "\"hosts\"").expect("write");

        let err = registry.list().expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Registry);
        assert_eq!(err.path(), Some(path.as_path()));
    }

    #[test]
    fn add_rejects_bad_alias_and_url() {
        let (_temp, registry) = registry();
        let err = registry
            .add("", "http://a:9000", "k", "s")
            .expect_err("empty alias");
        assert_eq!(err.kind(), ErrorKind::Registry);

        let err = registry
            .add("local", "ftp://a:9000", "k", "s")
            .expect_err("bad scheme");
        assert_eq!(err.kind(), ErrorKind::Registry);
        assert!(registry.list().expect("list").is_empty());
    }

    #[test]
    fn endpoint_url_rules() {
        assert!(ensure_endpoint_url("http://localhost:9000").is_ok());
        assert!(ensure_endpoint_url("https://play.example.com/").is_ok());
        assert!(ensure_endpoint_url("http://localhost:9000/bucket").is_err());
        assert!(ensure_endpoint_url("not a url").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn registry_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (_temp, registry) = registry();
        registry.add("local", "http://a:9000", "k", "s").expect("add");
        let mode = std::fs::metadata(registry.path())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn lock_path_is_sidecar() {
        let path = PathBuf::from("/tmp/objadm/hosts.json");
        assert_eq!(lock_path(&path), PathBuf::from("/tmp/objadm/hosts.json.lock"));
    }
}
