//! Resumable single-stream download to disk
//!
//! One item is one HTTP GET streamed into `<file>.part`, resumed with a
//! `Range` header when a previous attempt left bytes behind, and renamed
//! into place atomically on success. The `.part` file is deliberately left
//! on disk after a failure so the next attempt continues from its offset.

use std::io::SeekFrom;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Suffix of in-progress download files next to their final name
pub(crate) const PART_SUFFIX: &str = ".part";

/// What a download attempt learned and achieved, success or not
pub(crate) struct FetchReport {
    /// Total expected size once the response declared a Content-Length
    pub size_expected: Option<u64>,
    /// Bytes present in the temp file after this attempt (offset + written)
    pub size_downloaded: u64,
    /// Final outcome of the attempt
    pub result: Result<()>,
}

/// Download `url` into `data_dir/file_name`, resuming a partial file if one
/// exists
///
/// Progress fields are populated even when the attempt fails partway so the
/// caller can persist accurate sizes alongside the error.
pub(crate) async fn fetch_to_disk(
    client: &reqwest::Client,
    url: &str,
    data_dir: &Path,
    file_name: &str,
) -> FetchReport {
    let mut report = FetchReport {
        size_expected: None,
        size_downloaded: 0,
        result: Ok(()),
    };
    report.result = run(client, url, data_dir, file_name, &mut report).await;
    report
}

async fn run(
    client: &reqwest::Client,
    url: &str,
    data_dir: &Path,
    file_name: &str,
    report: &mut FetchReport,
) -> Result<()> {
    fs::create_dir_all(data_dir).await?;

    let dst_path = data_dir.join(file_name);
    let tmp_path = data_dir.join(format!("{file_name}{PART_SUFFIX}"));

    // Resume support: a leftover .part file gives us the starting offset.
    let start_offset = match fs::metadata(&tmp_path).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };

    let mut request = client.get(url);
    if start_offset > 0 {
        request = request.header(reqwest::header::RANGE, format!("bytes={start_offset}-"));
    }

    let mut response = request.send().await?;
    let status = response.status();
    if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::PARTIAL_CONTENT {
        return Err(Error::BadStatus { status });
    }

    // A 200 to a Range request means the origin ignored the range and is
    // sending the whole body; restart from a clean file instead of writing
    // fresh bytes after a stale prefix.
    let offset = if status == reqwest::StatusCode::OK && start_offset > 0 {
        tracing::debug!(url, "Origin ignored Range request, restarting from zero");
        0
    } else {
        start_offset
    };

    if let Some(length) = response.content_length() {
        if length > 0 {
            report.size_expected = Some(offset + length);
        }
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&tmp_path)
        .await?;
    if offset < start_offset {
        file.set_len(0).await?;
    }
    file.seek(SeekFrom::Start(offset)).await?;

    let mut written: u64 = 0;
    let copy_result = loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if let Err(error) = file.write_all(&chunk).await {
                    break Err(Error::Io(error));
                }
                written += chunk.len() as u64;
            }
            Ok(None) => break Ok(()),
            Err(error) => break Err(Error::Network(error)),
        }
    };
    report.size_downloaded = offset + written;

    if let Err(error) = copy_result {
        // Keep whatever landed on disk; the next attempt resumes from it.
        let _ = file.flush().await;
        return Err(error);
    }

    file.flush().await?;
    drop(file);

    fs::rename(&tmp_path, &dst_path).await?;
    Ok(())
}
