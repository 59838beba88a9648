//! Library listing: report what is currently persisted in storage.
//!
//! Stateless with respect to the ingest pipeline; every call re-reads the
//! storage directory. Files still carrying the temp suffix are skipped, so an
//! upload mid-flight never appears in a listing.

use crate::generated::VideoRecord;
use crate::naming::playback_url;
use crate::TEMP_SUFFIX;
use log::warn;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Enumerate non-temporary files in `storage_dir`, newest-created first.
/// A missing directory yields an empty list, not an error.
pub fn list_videos(storage_dir: &Path, public_base_url: &str) -> Vec<VideoRecord> {
    let entries = match fs::read_dir(storage_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!("listing {} failed: {}", storage_dir.display(), err);
            return Vec::new();
        }
    };

    let mut records: Vec<(i64, VideoRecord)> = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry in {}: {}", storage_dir.display(), err);
                continue;
            }
        };

        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.ends_with(TEMP_SUFFIX) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(err) => {
                warn!("skipping {}: {}", file_name, err);
                continue;
            }
        };

        let created = metadata_created_seconds(&metadata);
        let id = Path::new(&file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());

        records.push((
            created,
            VideoRecord {
                id,
                file_name: file_name.clone(),
                size_bytes: metadata.len() as i64,
                playback_url: playback_url(public_base_url, &file_name),
                uploaded_at_unix: created,
            },
        ));
    }

    records.sort_by(|a, b| b.0.cmp(&a.0));
    records.into_iter().map(|(_, record)| record).collect()
}

/// Creation time as unix seconds, falling back to mtime on filesystems that
/// do not record birth times.
fn metadata_created_seconds(meta: &fs::Metadata) -> i64 {
    let stamp = meta.created().or_else(|_| meta.modified());
    match stamp {
        Ok(time) => match time.duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_secs() as i64,
            Err(err) => -(err.duration().as_secs() as i64),
        },
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn missing_directory_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("nope");
        assert!(list_videos(&absent, "http://host").is_empty());
    }

    #[test]
    fn temp_files_are_excluded() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("done.mp4"))
            .unwrap()
            .write_all(b"abc")
            .unwrap();
        File::create(dir.path().join("tmp_123.part"))
            .unwrap()
            .write_all(b"partial")
            .unwrap();

        let records = list_videos(dir.path(), "http://host");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "done.mp4");
        assert_eq!(records[0].size_bytes, 3);
        assert_eq!(records[0].id, "done");
        assert_eq!(records[0].playback_url, "http://host/media/done.mp4");
    }

    #[test]
    fn records_carry_encoded_playback_urls() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("my clip.mp4")).unwrap();

        let records = list_videos(dir.path(), "http://host:5000");
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].playback_url,
            "http://host:5000/media/my%20clip.mp4"
        );
    }
}
