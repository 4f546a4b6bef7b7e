//! Single-transfer driver and the shared post-transfer decision tree.
//!
//! [`DownloadEngine::download`] runs exactly one payload to completion
//! against its current URL. The assessment and publication halves
//! ([`assess_attempt`], [`publish_attempt`], [`finalize_failure`]) are
//! shared with the multi driver, whose finished-download handling is the
//! same tree plus mirror failover.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use tokio::fs::File;
use tracing::{debug, error};

use super::session::{plan_transfer, Session, SessionError, SessionOutcome};
use super::{DownloadEngine, Transfer, TransferStatus};
use crate::error::{Error, Result};
use crate::partfile;
use crate::payload::{OpenMode, Payload};
use crate::utils::urls;

/// What one attempt amounted to, after assessment.
pub(super) enum AttemptVerdict {
    /// The body arrived intact; proceed to publication.
    Success(SessionOutcome),
    /// The If-Modified-Since condition held and nothing was downloaded.
    UpToDate,
    Failed {
        error: Error,
        /// Whether trying the next mirror makes sense.
        recoverable: bool,
        /// Last-Modified observed before the failure, if any.
        remote_time: Option<DateTime<FixedOffset>>,
        /// Bytes the failed attempt downloaded.
        bytes: u64,
    },
}

impl DownloadEngine {
    /// Downloads one payload into `cachedir`.
    ///
    /// Returns the transfer summary on success (`Downloaded` or
    /// `UpToDate`); all failures return `Err` — for `errors_ok` payloads
    /// the failure is logged at debug level only, but the caller still
    /// decides whether to tolerate it.
    pub async fn download(&self, payload: &mut Payload, cachedir: &Path) -> Result<Transfer> {
        if let Some(fetch) = self.config.fetch.clone() {
            let url = attempt_url(payload)?;
            payload.ensure_remote_name();
            return match fetch(&url, cachedir, payload.force) {
                Some(status) => Ok(Transfer {
                    status,
                    final_file: None,
                    effective_url: None,
                    bytes_downloaded: 0,
                }),
                None => Err(Error::ExternalDownload),
            };
        }
        self.download_internal(payload, cachedir).await
    }

    async fn download_internal(&self, payload: &mut Payload, cachedir: &Path) -> Result<Transfer> {
        // fresh attempt: drop any naming left over from a previous call
        payload.state.tempfile_name = None;
        payload.state.destfile_name = None;
        payload.state.content_disp_name = None;
        payload.state.open_mode = OpenMode::Truncate;

        let url = attempt_url(payload)?;
        payload.ensure_remote_name();

        let host = match urls::host_from_url(&url) {
            Ok(host) => host.to_string(),
            Err(err) => {
                error!("url '{url}' is invalid");
                return Err(err);
            }
        };

        let mut file_slot = assign_names(payload, cachedir, true).await?;

        debug!("{}: url is {url}", payload.remote_name());
        if payload.max_size > 0 {
            debug!("{}: maxsize {}", payload.remote_name(), payload.max_size);
        }
        let plan = plan_transfer(payload);

        if payload.max_size > 0 && payload.state.initial_size == payload.max_size {
            // the .part file already holds every byte the cap allows
            debug!("{}: part file is complete", payload.remote_name());
            self.emit_init(payload);
            file_slot = None;
            let final_file = match publish_attempt(payload, &mut file_slot, None).await {
                Ok(name) => name,
                Err(err) => {
                    self.emit_completed(payload, 0, -1);
                    return Err(err);
                }
            };
            self.emit_completed(payload, 0, 0);
            return Ok(Transfer {
                status: TransferStatus::Downloaded,
                final_file: Some(final_file),
                effective_url: None,
                bytes_downloaded: 0,
            });
        }

        if file_slot.is_none() {
            let temp = tempfile_path(payload)?;
            file_slot = Some(partfile::open_part(&temp, payload.state.open_mode).await.map_err(
                |err| {
                    error!("could not open file {}: {err}", temp.display());
                    err
                },
            )?);
            debug!(
                "opened tempfile for download: {} ({:?})",
                temp.display(),
                payload.state.open_mode
            );
        }

        self.emit_init(payload);

        let session = Session {
            client: &self.client,
            interrupt: &self.interrupt,
            events: self.config.events.as_ref(),
            disable_timeout: self.config.disable_download_timeout,
        };
        let file = file_slot.as_mut().ok_or_else(|| Error::System {
            source: std::io::Error::other("part file not open"),
        })?;
        let result = session.run(payload, &plan, &url, file).await;

        match assess_attempt(payload, result, &mut file_slot, &host).await {
            AttemptVerdict::Success(outcome) => {
                if payload.trust_remote_name {
                    retarget_destination(payload, &outcome, cachedir);
                }
                let final_file =
                    match publish_attempt(payload, &mut file_slot, outcome.remote_time).await {
                        Ok(name) => name,
                        Err(err) => {
                            finalize_failure(payload, &mut file_slot, None).await;
                            self.emit_completed(payload, outcome.bytes_downloaded, -1);
                            return Err(err);
                        }
                    };
                self.emit_completed(payload, outcome.bytes_downloaded, 0);
                Ok(Transfer {
                    status: TransferStatus::Downloaded,
                    final_file: Some(final_file),
                    effective_url: Some(outcome.effective_url),
                    bytes_downloaded: outcome.bytes_downloaded,
                })
            }
            AttemptVerdict::UpToDate => {
                drop(file_slot.take());
                if let Some(temp) = payload.state.tempfile_name.clone() {
                    partfile::unlink(&temp).await;
                }
                self.emit_completed(payload, 0, 1);
                Ok(Transfer {
                    status: TransferStatus::UpToDate,
                    final_file: None,
                    effective_url: None,
                    bytes_downloaded: 0,
                })
            }
            AttemptVerdict::Failed {
                error,
                remote_time,
                bytes,
                ..
            } => {
                finalize_failure(payload, &mut file_slot, remote_time).await;
                self.emit_completed(payload, bytes, -1);
                Err(error)
            }
        }
    }
}

/// Resolves the URL for the current attempt: a caller-provided direct URL
/// wins, otherwise the head of the mirror list.
pub(super) fn attempt_url(payload: &mut Payload) -> Result<String> {
    if let Some(url) = payload.state.fileurl.clone() {
        return Ok(url);
    }
    if payload.servers.is_empty() {
        return Err(Error::ServerNone);
    }
    payload.rebuild_fileurl();
    payload.state.fileurl.clone().ok_or(Error::ServerNone)
}

pub(super) fn tempfile_path(payload: &Payload) -> Result<PathBuf> {
    payload
        .state
        .tempfile_name
        .clone()
        .ok_or_else(|| Error::System {
            source: std::io::Error::other("no temp file assigned"),
        })
}

/// Chooses between the named `.part` scheme and an anonymous temp file,
/// recording the paths on the payload. Returns an already-open file for the
/// anonymous case.
///
/// `sig_guard` preserves a quirk of the single driver: a remote name of
/// literally `".sig"` is routed to the anonymous path, so an ill-formed
/// signature payload can never clobber `<pkg>.sig.part`.
pub(super) async fn assign_names(
    payload: &mut Payload,
    cachedir: &Path,
    sig_guard: bool,
) -> Result<Option<File>> {
    let name = payload.remote_name().to_string();
    if !name.is_empty() && !(sig_guard && name == ".sig") {
        payload.state.destfile_name = Some(urls::fullpath(cachedir, &name, ""));
        payload.state.tempfile_name = Some(urls::fullpath(cachedir, &name, ".part"));
        Ok(None)
    } else {
        // no usable filename: write to an exclusive temp. This kind of
        // download cannot resume; partial transfers are destroyed.
        payload.state.unlink_on_fail = true;
        let (file, path) = partfile::create_anonymous(cachedir).await.map_err(|err| {
            error!("failed to create temporary file for download");
            err
        })?;
        payload.state.remote_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        payload.state.tempfile_name = Some(path);
        Ok(Some(file))
    }
}

/// Applies the post-transfer decision tree to a finished session, mutating
/// the unlink policy and logging as it goes. Does not touch the filesystem
/// beyond the zero-length probe; publication and cleanup are separate so
/// the multi driver can interpose mirror failover.
pub(super) async fn assess_attempt(
    payload: &mut Payload,
    result: std::result::Result<SessionOutcome, SessionError>,
    file_slot: &mut Option<File>,
    host: &str,
) -> AttemptVerdict {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => return assess_session_error(payload, err, file_slot, host).await,
    };
    let name = payload.remote_name().to_string();

    debug!("{name}: response code {}", outcome.respcode);
    if outcome.respcode >= 400 {
        payload.state.unlink_on_fail = true;
        let reason = format!("the requested URL returned error: {}", outcome.respcode);
        if payload.errors_ok {
            debug!("failed retrieving file '{name}' from {host} : {reason}");
        } else {
            error!("failed retrieving file '{name}' from {host} : {reason}");
        }
        return AttemptVerdict::Failed {
            error: Error::Retrieve { reason },
            recoverable: true,
            remote_time: outcome.remote_time,
            bytes: outcome.bytes_downloaded,
        };
    }

    if outcome.condition_unmet && outcome.bytes_downloaded == 0 {
        debug!("{name}: file met time condition");
        return AttemptVerdict::UpToDate;
    }

    // remote_size is what the server said was left to download, not the
    // full size of the file; compare it to what actually arrived
    if let Some(remaining) = outcome.remote_size {
        if outcome.bytes_downloaded != remaining {
            error!(
                "{name} appears to be truncated: {}/{} bytes",
                outcome.bytes_downloaded, remaining
            );
            return AttemptVerdict::Failed {
                error: Error::Retrieve {
                    reason: format!(
                        "{name} appears to be truncated: {}/{} bytes",
                        outcome.bytes_downloaded, remaining
                    ),
                },
                recoverable: false,
                remote_time: outcome.remote_time,
                bytes: outcome.bytes_downloaded,
            };
        }
    }

    AttemptVerdict::Success(outcome)
}

async fn assess_session_error(
    payload: &mut Payload,
    err: SessionError,
    file_slot: &mut Option<File>,
    host: &str,
) -> AttemptVerdict {
    let name = payload.remote_name().to_string();
    match err {
        SessionError::SizeExceeded => {
            payload.state.unlink_on_fail = true;
            error!(
                "failed retrieving file '{name}' from {host} : expected download size exceeded"
            );
            AttemptVerdict::Failed {
                error: Error::SizeExceeded {
                    limit: payload.max_size,
                },
                recoverable: false,
                remote_time: None,
                bytes: 0,
            }
        }
        SessionError::Cancelled => AttemptVerdict::Failed {
            error: Error::Cancelled,
            recoverable: false,
            remote_time: None,
            bytes: 0,
        },
        SessionError::Send(source) if is_host_failure(&source) => {
            payload.state.unlink_on_fail = true;
            error!("failed retrieving file '{name}' from {host} : {source}");
            AttemptVerdict::Failed {
                error: Error::ServerBadUrl {
                    url: payload.state.fileurl.clone().unwrap_or_default(),
                },
                recoverable: true,
                remote_time: None,
                bytes: 0,
            }
        }
        SessionError::Send(source) => {
            transport_failure(payload, file_slot, host, Error::Transport { source }).await
        }
        SessionError::Body(source) => {
            transport_failure(payload, file_slot, host, source.into()).await
        }
        SessionError::Stalled => {
            transport_failure(
                payload,
                file_slot,
                host,
                Error::Stalled(super::session::LOW_SPEED_WINDOW_SECS),
            )
            .await
        }
        SessionError::Io(source) => AttemptVerdict::Failed {
            error: Error::System { source },
            recoverable: false,
            remote_time: None,
            bytes: 0,
        },
    }
}

/// The catch-all transport failure path: zero-length downloads are marked
/// for deletion, and the error line is demoted to debug for optional
/// payloads.
async fn transport_failure(
    payload: &mut Payload,
    file_slot: &mut Option<File>,
    host: &str,
    error: Error,
) -> AttemptVerdict {
    if let Some(file) = file_slot.as_ref() {
        if let Ok(meta) = file.metadata().await {
            if meta.len() == 0 {
                payload.state.unlink_on_fail = true;
            }
        }
    }
    let name = payload.remote_name();
    if payload.errors_ok {
        debug!("failed retrieving file '{name}' from {host} : {error}");
    } else {
        error!("failed retrieving file '{name}' from {host} : {error}");
    }
    AttemptVerdict::Failed {
        error,
        recoverable: true,
        remote_time: None,
        bytes: 0,
    }
}

fn is_host_failure(err: &reqwest_middleware::Error) -> bool {
    match err {
        reqwest_middleware::Error::Reqwest(source) => source.is_connect(),
        reqwest_middleware::Error::Middleware(_) => false,
    }
}

/// Recomputes the destination from server-provided hints: the
/// Content-Disposition basename wins, otherwise a non-trivial effective-URL
/// tail that differs from the current name.
pub(super) fn retarget_destination(
    payload: &mut Payload,
    outcome: &SessionOutcome,
    cachedir: &Path,
) {
    if let Some(disp) = payload.state.content_disp_name.as_deref() {
        let basename = urls::filename_from_url(disp).to_string();
        payload.state.destfile_name = Some(urls::fullpath(cachedir, &basename, ""));
        return;
    }

    let tail = urls::filename_from_url(&outcome.effective_url);
    if tail.len() > 1 {
        let current = payload
            .state
            .destfile_name
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned());
        if current.as_deref() != Some(tail) {
            payload.state.destfile_name = Some(urls::fullpath(cachedir, tail, ""));
        }
    }
}

/// Closes the part file, applies the server mtime, and renames the temp
/// onto the destination. Returns the basename of the published file.
pub(super) async fn publish_attempt(
    payload: &mut Payload,
    file_slot: &mut Option<File>,
    remote_time: Option<DateTime<FixedOffset>>,
) -> Result<String> {
    let temp = tempfile_path(payload)?;
    if let Some(file) = file_slot.take() {
        drop(file);
    }
    if let Some(mtime) = remote_time {
        partfile::apply_remote_mtime(&temp, mtime);
    }

    let realname = match payload.state.destfile_name.clone() {
        Some(dest) => {
            if let Err(err) = partfile::publish(&temp, &dest).await {
                error!(
                    "could not rename {} to {} ({err})",
                    temp.display(),
                    dest.display()
                );
                return Err(err);
            }
            dest
        }
        None => temp,
    };

    Ok(realname
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default())
}

/// Failure cleanup: close the part file, apply any observed mtime, and
/// honor the unlink policy.
pub(super) async fn finalize_failure(
    payload: &mut Payload,
    file_slot: &mut Option<File>,
    remote_time: Option<DateTime<FixedOffset>>,
) {
    let had_file = file_slot.is_some();
    if let Some(file) = file_slot.take() {
        drop(file);
    }
    if let (true, Some(mtime), Some(temp)) =
        (had_file, remote_time, payload.state.tempfile_name.as_deref())
    {
        partfile::apply_remote_mtime(temp, mtime);
    }
    if payload.state.unlink_on_fail {
        if let Some(temp) = payload.state.tempfile_name.clone() {
            partfile::unlink(&temp).await;
        }
    }
}
