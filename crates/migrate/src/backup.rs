use crate::MigrateError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive every directory in `dirs` into one timestamped zip under
/// `backup_dir`. Each directory's files land under its own name.
pub fn backup_directories(dirs: &[PathBuf], backup_dir: &Path) -> Result<PathBuf, MigrateError> {
    let failed = |path: &Path, reason: String| MigrateError::BackupFailed {
        path: path.to_path_buf(),
        reason,
    };
    std::fs::create_dir_all(backup_dir).map_err(|e| failed(backup_dir, e.to_string()))?;
    let (archive_path, file) = create_archive(backup_dir).map_err(|e| failed(backup_dir, e.to_string()))?;

    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for dir in dirs {
        let prefix = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| failed(dir.as_path(), "directory has no name".into()))?;
        let mut files = Vec::new();
        collect_files(dir, &mut files).map_err(|e| failed(dir.as_path(), e.to_string()))?;
        for file_path in files {
            let rel = file_path
                .strip_prefix(dir)
                .map_err(|e| failed(file_path.as_path(), e.to_string()))?;
            let name = format!("{prefix}/{}", rel.to_string_lossy().replace('\\', "/"));
            let bytes = std::fs::read(&file_path).map_err(|e| failed(file_path.as_path(), e.to_string()))?;
            zip.start_file(name, options)
                .map_err(|e| failed(archive_path.as_path(), e.to_string()))?;
            zip.write_all(&bytes)
                .map_err(|e| failed(archive_path.as_path(), e.to_string()))?;
        }
        tracing::debug!(dir = %dir.display(), "added directory to backup");
    }
    zip.finish().map_err(|e| failed(archive_path.as_path(), e.to_string()))?;
    tracing::info!(archive = %archive_path.display(), dirs = dirs.len(), "wrote migration backup");
    Ok(archive_path)
}

fn create_archive(backup_dir: &Path) -> std::io::Result<(PathBuf, File)> {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("snapshot_backup_{stamp}.zip")
        } else {
            format!("snapshot_backup_{stamp}_{attempt}.zip")
        };
        let path = backup_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < 100 => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
