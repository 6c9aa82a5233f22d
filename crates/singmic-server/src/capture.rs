//! Per-peer raw audio capture files.
//!
//! One file per peer address (`mic_<ip>.raw`) in the capture directory. A new
//! performance truncates the previous take for that peer.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Opens capture streams inside one directory.
#[derive(Debug, Clone)]
pub(crate) struct CaptureStore {
    dir: PathBuf,
}

impl CaptureStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File path used for a peer.
    ///
    /// IPv6 separators are replaced so the name is valid on every platform.
    pub(crate) fn path_for(&self, ip: IpAddr) -> PathBuf {
        let name = ip.to_string().replace(':', "-");
        self.dir.join(format!("mic_{name}.raw"))
    }

    /// Create (or truncate) the capture file for a peer.
    pub(crate) fn open(&self, ip: IpAddr) -> io::Result<CaptureStream> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(ip);
        let file = File::create(&path)?;
        Ok(CaptureStream {
            path,
            writer: BufWriter::new(file),
            bytes_written: 0,
        })
    }
}

/// An open capture file. Closing flushes buffered samples.
#[derive(Debug)]
pub(crate) struct CaptureStream {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl CaptureStream {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub(crate) fn write(&mut self, samples: &[u8]) -> io::Result<()> {
        self.writer.write_all(samples)?;
        self.bytes_written += samples.len() as u64;
        Ok(())
    }

    /// Flush and release the file, returning the total bytes captured.
    pub(crate) fn close(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        Ok(self.bytes_written)
    }
}

#[cfg(test)]
pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("singmic-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&p);
    p
}
