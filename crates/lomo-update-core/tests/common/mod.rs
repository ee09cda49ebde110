#![allow(dead_code)]

use std::io::{Cursor, Write as _};
use std::path::Path;

use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;

pub const PLATFORM: &str = "test-os";

/// A release archive holding `<top>/VERSION` and `<top>/bin/lomod`.
pub fn release_zip(top: &str, version: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o755);
    writer
        .add_directory(format!("{top}/"), options)
        .expect("directory entry should be written");
    writer
        .start_file(format!("{top}/VERSION"), options)
        .expect("version entry should be started");
    writer
        .write_all(version.as_bytes())
        .expect("version entry should be written");
    writer
        .start_file(format!("{top}/bin/lomod"), options)
        .expect("binary entry should be started");
    writer
        .write_all(b"new-binary")
        .expect("binary entry should be written");
    writer
        .finish()
        .expect("zip archive should be finalized")
        .into_inner()
}

pub fn zip_with_entry(name: &str, body: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(name, SimpleFileOptions::default())
        .expect("entry should be started");
    writer.write_all(body).expect("entry should be written");
    writer
        .finish()
        .expect("zip archive should be finalized")
        .into_inner()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn install(dir: &Path, version: &str) {
    std::fs::create_dir_all(dir.join("bin")).expect("install dir should be created");
    std::fs::write(dir.join("VERSION"), version).expect("version file should be written");
    std::fs::write(dir.join("bin/lomod"), b"old-binary").expect("binary should be written");
}

pub fn read_version(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("VERSION")).expect("VERSION should be readable")
}

pub fn entries(dir: &Path) -> Vec<String> {
    let Ok(read) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = read
        .map(|entry| {
            entry
                .expect("directory entry should be readable")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}
