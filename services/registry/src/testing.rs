//! Builds registry stores on disk for tests.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest as _, Sha256};
use tempfile::TempDir;

use crate::config::RegistryConfig;
use crate::digest::{Algorithm, Digest};
use crate::layout::{Layout, MANIFESTS_DIR};

pub(crate) struct Store {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Store {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(Layout::new(root.clone()).repositories()).unwrap();
        Self { _dir: dir, root }
    }

    pub(crate) fn layout(&self) -> Layout {
        Layout::new(self.root.clone())
    }

    pub(crate) fn config(&self) -> RegistryConfig {
        RegistryConfig::new(self.root.clone())
    }

    pub(crate) fn digest_of(content: &[u8]) -> Digest {
        Digest::from_raw(Algorithm::Sha256, hex::encode(Sha256::digest(content))).unwrap()
    }

    pub(crate) fn put_blob(&self, content: &[u8]) -> Digest {
        let digest = Self::digest_of(content);
        let path = self.layout().blob_data(&digest).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        digest
    }

    pub(crate) fn put_json(&self, value: &serde_json::Value) -> Digest {
        self.put_blob(&serde_json::to_vec(value).unwrap())
    }

    pub(crate) fn repository_path(&self, name: &str) -> Utf8PathBuf {
        self.layout().repositories().join(name)
    }

    pub(crate) fn add_repository(&self, name: &str) -> Utf8PathBuf {
        let path = self.repository_path(name);
        fs::create_dir_all(path.join(MANIFESTS_DIR)).unwrap();
        path
    }

    pub(crate) fn add_revision(&self, name: &str, digest: &Digest) {
        let path = Layout::revisions(&self.add_repository(name)).join(digest.encoded());
        write_file(&path.join("link"), &digest.to_string());
    }

    pub(crate) fn add_tag(&self, name: &str, tag: &str, target: &str) {
        let link = Layout::tag_link(&self.add_repository(name), tag);
        write_file(&link, target);
    }

    pub(crate) fn remove_repository(&self, name: &str) {
        fs::remove_dir_all(self.repository_path(name)).unwrap();
    }
}

fn write_file(path: &Utf8Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
