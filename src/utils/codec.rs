//! Streaming gzip codec between external processes and files.
//!
//! Compression and decompression run on the blocking pool and talk to the
//! process runner through a bounded in-memory pipe, so dumps of any size
//! pass through with constant memory.

use crate::error::ServiceError;
use crate::utils::command::{CommandSpec, Input, Output};
use crate::utils::executor::CommandExecutor;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, warn};

/// Capacity of the in-memory pipe between the process and the codec
const PIPE_CAPACITY: usize = 64 * 1024;

/// File suffix that marks a gzip-compressed artifact
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Background half of a codec pipe; must be joined to observe its errors
#[derive(Debug)]
pub struct StreamTask {
    handle: Option<JoinHandle<io::Result<()>>>,
}

impl StreamTask {
    fn none() -> Self {
        Self { handle: None }
    }

    /// Wait for the background copy and surface its result
    pub async fn join(self) -> io::Result<()> {
        match self.handle {
            None => Ok(()),
            Some(handle) => handle
                .await
                .map_err(|e| io::Error::other(e.to_string()))?,
        }
    }
}

pub fn is_compressed(path: &Path) -> bool {
    path.to_string_lossy().ends_with(COMPRESSED_SUFFIX)
}

/// Build a process output that gzips everything written to it into `dest`.
///
/// The encoder trailer is written and the file synced once the output is
/// shut down and the returned task is joined. A file whose task was never
/// joined successfully lacks the trailer and fails to decompress.
pub fn compress_output(dest: &Path) -> io::Result<(Output, StreamTask)> {
    let file = File::create(dest)?;
    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    let mut source = SyncIoBridge::new(reader);

    let handle = tokio::task::spawn_blocking(move || {
        let mut encoder = GzEncoder::new(file, Compression::default());
        io::copy(&mut source, &mut encoder)?;
        let file = encoder.finish()?;
        file.sync_all()
    });

    Ok((
        Output::Writer(Box::new(writer)),
        StreamTask {
            handle: Some(handle),
        },
    ))
}

/// Build a process input reading from `src`, gunzipping when its name ends
/// in `.gz` and passing bytes through untouched otherwise.
pub fn decompress_input(src: &Path) -> io::Result<(Input, StreamTask)> {
    let file = File::open(src)?;

    if !is_compressed(src) {
        let reader = tokio::fs::File::from_std(file);
        return Ok((Input::Reader(Box::new(reader)), StreamTask::none()));
    }

    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    let mut sink = SyncIoBridge::new(writer);

    let handle = tokio::task::spawn_blocking(move || {
        let mut decoder = GzDecoder::new(BufReader::new(file));
        io::copy(&mut decoder, &mut sink)?;
        sink.flush()?;
        sink.shutdown()
    });

    Ok((
        Input::Reader(Box::new(reader)),
        StreamTask {
            handle: Some(handle),
        },
    ))
}

/// Run `spec` with its stdout gzipped into `dest`.
///
/// On any failure the partial file is removed so it cannot be mistaken for
/// a finished backup.
pub async fn run_to_compressed_file(
    executor: &dyn CommandExecutor,
    spec: &CommandSpec,
    dest: &Path,
) -> Result<(), ServiceError> {
    let (output, encoder) = compress_output(dest)
        .map_err(|e| ServiceError::io(format!("cannot create file {}", dest.display()), e))?;

    let ran = executor.run(spec, Input::Null, output).await;
    let encoded = encoder.join().await;

    let result = match (ran, encoded) {
        (Err(e), _) => Err(ServiceError::from(e)),
        (Ok(_), Err(e)) => Err(ServiceError::io(
            format!("cannot compress output to {}", dest.display()),
            e,
        )),
        (Ok(_), Ok(())) => Ok(()),
    };

    if result.is_err() {
        discard_partial(dest).await;
    } else {
        debug!(path = %dest.display(), "Compressed output written");
    }
    result
}

/// Run `spec` with `src` fed to its stdin, decompressing when needed
pub async fn run_from_file(
    executor: &dyn CommandExecutor,
    spec: &CommandSpec,
    src: &Path,
) -> Result<(), ServiceError> {
    let (input, decoder) = decompress_input(src)
        .map_err(|e| ServiceError::io(format!("cannot open file {}", src.display()), e))?;

    let ran = executor.run(spec, input, Output::Inherit).await;
    let decoded = decoder.join().await;

    ran?;
    decoded.map_err(|e| ServiceError::io(format!("cannot decompress {}", src.display()), e))
}

async fn discard_partial(path: &Path) {
    let path: PathBuf = path.to_path_buf();
    if let Err(e) = tokio::fs::remove_file(&path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove partial output {}: {}", path.display(), e);
        }
    }
}
