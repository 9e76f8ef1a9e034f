//! Local payload archive: gzip tar packing, file digests, cleanup.

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use md5::Md5;
use sha2::{Digest, Sha256};

use crate::application::ports::LocalPayload;
use crate::domain::ChecksumAlgorithm;
use crate::domain::checksum::hex_encode;

/// Production `LocalPayload` on the local filesystem.
pub struct ArchivePayload;

impl LocalPayload for ArchivePayload {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    async fn pack(&self, sources: &[PathBuf], archive: &Path) -> Result<u64> {
        let sources = sources.to_vec();
        let archive = archive.to_path_buf();
        tokio::task::spawn_blocking(move || pack_archive(&sources, &archive))
            .await
            .context("spawn_blocking for pack")?
    }

    async fn checksum(&self, path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || match algorithm {
            ChecksumAlgorithm::Md5 => digest_file::<Md5>(&path),
            ChecksumAlgorithm::Sha256 => digest_file::<Sha256>(&path),
        })
        .await
        .context("spawn_blocking for checksum")?
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("removing file {}", path.display()))
    }
}

/// Write every source directory, under its own name, into a gzip tar at
/// maximum compression. Returns the archive size.
///
/// # Errors
///
/// Returns an error if a source cannot be read or the archive written.
pub fn pack_archive(sources: &[PathBuf], archive: &Path) -> Result<u64> {
    let file =
        File::create(archive).with_context(|| format!("creating {}", archive.display()))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::best());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for source in sources {
        let name = source
            .file_name()
            .with_context(|| format!("{} has no directory name", source.display()))?;
        builder
            .append_dir_all(name, source)
            .with_context(|| format!("archiving {}", source.display()))?;
    }

    let encoder = builder.into_inner().context("finishing tar stream")?;
    let mut writer = encoder.finish().context("finishing gzip stream")?;
    std::io::Write::flush(&mut writer).context("flushing archive")?;
    drop(writer);

    let size = std::fs::metadata(archive)
        .with_context(|| format!("reading {}", archive.display()))?
        .len();
    Ok(size)
}

/// Hex digest of a file with any `Digest` implementation.
///
/// Reads the file in 64 KB chunks to avoid loading large files into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn digest_file<D: Digest>(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = file.read(&mut buf).context("reading file")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}
