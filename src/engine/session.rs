//! One transport attempt against one mirror.
//!
//! A [`Session`] is owned by a driver for the duration of a single attempt:
//! it builds the request (conditional GET or range resume as planned),
//! streams the body into the open part file, parses the response headers
//! the drivers care about (Content-Disposition, Last-Modified), enforces
//! the size cap and cancellation on every received chunk, and reports
//! deduplicated progress. What it returns is pure telemetry; deciding what
//! an attempt *means* (retry, publish, up-to-date) is driver business.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use futures::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, IF_MODIFIED_SINCE, LAST_MODIFIED, RANGE};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::events::{DownloadEvent, EventCallback};
use crate::interrupt::Interrupt;
use crate::partfile;
use crate::payload::{OpenMode, Payload};

/// Seconds without a received chunk before the transfer counts as stalled.
pub(crate) const LOW_SPEED_WINDOW_SECS: u64 = 10;

/// Per-attempt request shaping decided before the transfer starts.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TransferPlan {
    /// Send If-Modified-Since with this timestamp.
    pub time_condition: Option<DateTime<Utc>>,
    /// Ask the server to continue from this offset.
    pub resume_from: u64,
}

/// Telemetry of one finished attempt, successful or not.
#[derive(Debug, Clone)]
pub(crate) struct SessionOutcome {
    pub respcode: u16,
    /// Bytes streamed by this attempt.
    pub bytes_downloaded: u64,
    /// Bytes the server advertised as remaining; `None` for chunked bodies.
    pub remote_size: Option<u64>,
    /// The server's Last-Modified, when present and parseable.
    pub remote_time: Option<DateTime<FixedOffset>>,
    /// URL after redirects.
    pub effective_url: String,
    /// The If-Modified-Since condition held (HTTP 304).
    pub condition_unmet: bool,
}

/// Ways a streaming attempt can abort.
#[derive(Debug)]
pub(crate) enum SessionError {
    /// The request could not be dispatched: resolution, connection, TLS,
    /// or the redirect cap.
    Send(reqwest_middleware::Error),
    /// The body stream broke mid-transfer.
    Body(reqwest::Error),
    /// No chunk arrived within the low-speed window.
    Stalled,
    /// The size cap would have been exceeded.
    SizeExceeded,
    /// The interrupt token was tripped.
    Cancelled,
    /// Writing to the part file failed.
    Io(std::io::Error),
}

/// Decides conditional-GET vs. resume for the coming attempt, mutating the
/// payload's open mode and initial size accordingly.
pub(crate) fn plan_transfer(payload: &mut Payload) -> TransferPlan {
    let mut plan = TransferPlan::default();

    let dest_mtime = (!payload.allow_resume && !payload.force)
        .then(|| payload.state.destfile_name.as_deref())
        .flatten()
        .and_then(|dest| std::fs::metadata(dest).ok())
        .and_then(|meta| meta.modified().ok());

    if let Some(mtime) = dest_mtime {
        // start from scratch, but only download if our local is out of date
        let ts: DateTime<Utc> = mtime.into();
        debug!(
            "{}: using time condition {}",
            payload.remote_name(),
            ts.timestamp()
        );
        plan.time_condition = Some(ts);
    } else if payload.allow_resume {
        if let Some(temp) = payload.state.tempfile_name.as_deref() {
            if let Ok(meta) = std::fs::metadata(temp) {
                debug!(
                    "{}: tempfile found, attempting continuation from {} bytes",
                    payload.remote_name(),
                    meta.len()
                );
                plan.resume_from = meta.len();
                payload.state.open_mode = OpenMode::Append;
                payload.state.initial_size = meta.len();
            }
        }
    }

    plan
}

/// Extracts the filename from a Content-Disposition header value.
///
/// The field ends at a `;` or CRLF and surrounding quotes are stripped,
/// matching what transports themselves do with the header.
pub(crate) fn parse_content_disposition(header: &str) -> Option<&str> {
    let start = header.find("filename=")? + "filename=".len();
    let rest = &header[start..];
    let end = rest.find([';', '\r', '\n']).unwrap_or(rest.len());
    let mut field = &rest[..end];
    if field.len() >= 2 && field.starts_with('"') && field.ends_with('"') {
        field = &field[1..field.len() - 1];
    }
    (!field.is_empty()).then_some(field)
}

/// Formats a timestamp as an HTTP-date for If-Modified-Since.
fn http_date(ts: DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub(crate) struct Session<'a> {
    pub client: &'a ClientWithMiddleware,
    pub interrupt: &'a Interrupt,
    pub events: Option<&'a Arc<EventCallback>>,
    pub disable_timeout: bool,
}

impl Session<'_> {
    /// Runs one attempt: dispatches the request and streams the body into
    /// `file`.
    pub(crate) async fn run(
        &self,
        payload: &mut Payload,
        plan: &TransferPlan,
        url: &str,
        file: &mut File,
    ) -> Result<SessionOutcome, SessionError> {
        let mut request = self.client.get(url);
        if let Some(ts) = plan.time_condition {
            request = request.header(IF_MODIFIED_SINCE, http_date(ts));
        }
        if plan.resume_from > 0 {
            request = request.header(RANGE, format!("bytes={}-", plan.resume_from));
        }

        let response = request.send().await.map_err(SessionError::Send)?;

        let respcode = response.status().as_u16();
        payload.state.respcode = respcode;

        if let Some(value) = response.headers().get(CONTENT_DISPOSITION) {
            if let Some(name) = value.to_str().ok().and_then(parse_content_disposition) {
                payload.state.content_disp_name = Some(name.to_string());
            }
        }

        let remote_time = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok());

        let remote_size = response.content_length();
        let effective_url = response.url().to_string();
        let condition_unmet = response.status() == StatusCode::NOT_MODIFIED;

        if plan.resume_from > 0 && response.status() == StatusCode::OK {
            // the server ignored our range request; start over from scratch
            debug!("{}: server does not support resume", payload.remote_name());
            partfile::truncate_for_retry(file)
                .await
                .map_err(SessionError::Io)?;
            payload.state.initial_size = 0;
        }

        if payload.max_size > 0 {
            if let Some(size) = remote_size {
                if payload.state.initial_size + size > payload.max_size {
                    return Err(SessionError::SizeExceeded);
                }
            }
        }

        let mut bytes_downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        loop {
            let next = if self.disable_timeout {
                stream.next().await
            } else {
                match tokio::time::timeout(
                    Duration::from_secs(LOW_SPEED_WINDOW_SECS),
                    stream.next(),
                )
                .await
                {
                    Ok(item) => item,
                    Err(_) => return Err(SessionError::Stalled),
                }
            };
            let Some(item) = next else { break };
            let chunk = item.map_err(SessionError::Body)?;

            if self.interrupt.is_cancelled() {
                return Err(SessionError::Cancelled);
            }

            bytes_downloaded += chunk.len() as u64;
            if payload.max_size > 0
                && payload.state.initial_size + bytes_downloaded > payload.max_size
            {
                return Err(SessionError::SizeExceeded);
            }

            file.write_all(&chunk).await.map_err(SessionError::Io)?;
            self.report_progress(payload, remote_size, bytes_downloaded);
        }
        file.flush().await.map_err(SessionError::Io)?;

        Ok(SessionOutcome {
            respcode,
            bytes_downloaded,
            remote_size,
            remote_time,
            effective_url,
            condition_unmet,
        })
    }

    /// Emits one progress tick, applying the suppression and deduplication
    /// rules: nothing for signature payloads or redirect bodies, nothing
    /// without a known total, nothing once the cumulative total was already
    /// reported. `initial_size` is excluded from the reported window.
    fn report_progress(&self, payload: &mut Payload, remote_size: Option<u64>, downloaded: u64) {
        if payload.signature || payload.state.respcode >= 300 {
            return;
        }
        let Some(total) = remote_size else { return };
        if total == 0 || downloaded > total {
            return;
        }
        let Some(callback) = self.events else { return };

        if payload.state.prevprogress == payload.state.initial_size + total {
            return;
        }

        callback(
            payload.remote_name(),
            &DownloadEvent::Progress { total, downloaded },
        );
        payload.state.prevprogress = payload.state.initial_size + downloaded;
    }
}
