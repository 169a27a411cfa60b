use sha2::{Digest, Sha256};
use std::{
    fs,
    io::{self, Read, Seek},
    path::{Component, Path, PathBuf},
};

/// Unpacks a zip archive into `dest_root`, overwriting existing entries.
///
/// Entries with absolute paths or `..` components are rejected before
/// anything outside `dest_root` can be written.
pub fn extract_zip<R: Read + Seek>(reader: R, dest_root: &Path) -> io::Result<usize> {
    let mut zip = zip::ZipArchive::new(reader).map_err(zip_to_io)?;
    let mut files = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(zip_to_io)?;
        let rel = safe_entry_path(entry.name())?;
        let out_path = dest_root.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;
        files += 1;
    }
    Ok(files)
}

pub fn extract_zip_file(archive: &Path, dest_root: &Path) -> io::Result<usize> {
    let file = fs::File::open(archive)?;
    extract_zip(io::BufReader::new(file), dest_root)
}

fn safe_entry_path(name: &str) -> io::Result<PathBuf> {
    let path = Path::new(name);
    let escapes = path.is_absolute()
        || path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::Prefix(_) | Component::RootDir
            )
        });
    if escapes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid path in archive: {name}"),
        ));
    }
    Ok(path.to_path_buf())
}

fn zip_to_io(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Accepts `sha256sum` output, a bare digest, or a `sha256:` prefixed digest.
pub fn normalize_hex(value: &str) -> String {
    value
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_start_matches("sha256:")
        .to_ascii_lowercase()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::{Cursor, Write};

    /// Builds an in-memory zip with the given `(name, contents)` entries.
    pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default();
        for (name, contents) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(contents.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap().into_inner()
    }
}
