//! File-based audio cache

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::media::{AudioCache, AudioKey};
use crate::models::AudioRef;

/// Audio cache in a flat media directory
///
/// Directory structure:
/// ```text
/// media/
///   burnki_2467_ひとつ.mp3
///   burnki_2468_ふたつ.mp3
/// ```
pub struct FileAudioCache {
    root: PathBuf,
}

impl FileAudioCache {
    /// Create a new audio cache at the given path
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create media directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn audio_ref(&self, key: &AudioKey) -> AudioRef {
        let filename = key.filename();
        AudioRef {
            path: self.root.join(&filename),
            filename,
        }
    }
}

impl AudioCache for FileAudioCache {
    fn lookup(&self, key: &AudioKey) -> Result<Option<AudioRef>> {
        let audio = self.audio_ref(key);
        // Zero-length files are leftovers from an interrupted write
        match fs::metadata(&audio.path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(Some(audio)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to inspect {}", audio.path.display())),
        }
    }

    fn store(&self, key: &AudioKey, data: &[u8]) -> Result<AudioRef> {
        let audio = self.audio_ref(key);

        // Write atomically (write to temp, then rename)
        let temp_path = audio.path.with_extension("mp3.tmp");
        fs::write(&temp_path, data)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &audio.path)
            .with_context(|| format!("Failed to move audio into {}", audio.path.display()))?;

        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubjectId;
    use tempfile::tempdir;

    #[test]
    fn test_store_and_lookup() {
        let dir = tempdir().unwrap();
        let cache = FileAudioCache::new(dir.path().join("media")).unwrap();
        let key = AudioKey::new(SubjectId(2467), "ひとつ");

        assert!(cache.lookup(&key).unwrap().is_none());

        let stored = cache.store(&key, b"ID3 mp3 data").unwrap();
        assert_eq!(stored.filename, "burnki_2467_ひとつ.mp3");
        assert_eq!(fs::read(&stored.path).unwrap(), b"ID3 mp3 data");
        assert_eq!(cache.lookup(&key).unwrap(), Some(stored));
    }

    #[test]
    fn test_store_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let cache = FileAudioCache::new(dir.path()).unwrap();
        cache.store(&AudioKey::new(SubjectId(1), "いち"), b"data").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["burnki_1_いち.mp3"]);
    }

    #[test]
    fn test_empty_file_is_not_cached() {
        let dir = tempdir().unwrap();
        let cache = FileAudioCache::new(dir.path()).unwrap();
        let key = AudioKey::new(SubjectId(3), "さん");
        fs::write(dir.path().join(key.filename()), b"").unwrap();

        assert!(cache.lookup(&key).unwrap().is_none());
    }

    #[test]
    fn test_store_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let cache = FileAudioCache::new(dir.path()).unwrap();
        let key = AudioKey::new(SubjectId(4), "よん");

        cache.store(&key, b"old").unwrap();
        let stored = cache.store(&key, b"new").unwrap();
        assert_eq!(fs::read(&stored.path).unwrap(), b"new");
        assert_eq!(cache.lookup(&key).unwrap(), Some(stored));
    }
}
