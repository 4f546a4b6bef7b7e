//! Multi-transfer driver: parallel admission with per-payload mirror
//! failover.
//!
//! [`DownloadEngine::download_all`] keeps up to `parallel_downloads`
//! transfers in flight over the engine's shared client and processes
//! completions in whatever order the transfers finish. Mirrors are strictly
//! sequential within one payload; across payloads nothing is ordered. Once
//! a required payload fails (or a payload cannot even be admitted), no new
//! payloads are started, but transfers already in flight drain to
//! completion.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, StreamExt};
use tracing::{debug, error};

use super::session::{plan_transfer, Session, TransferPlan};
use super::single::{
    assess_attempt, assign_names, attempt_url, finalize_failure, publish_attempt,
    retarget_destination, tempfile_path, AttemptVerdict,
};
use super::DownloadEngine;
use crate::error::{Error, Result};
use crate::partfile;
use crate::payload::Payload;
use crate::utils::urls;

/// What one payload contributed to the batch.
enum MultiOutcome {
    /// Downloaded or up to date.
    Done,
    /// Failed, but the payload was optional.
    OptionalFailed,
    /// Failed and required; the batch stops admitting.
    Failed(Error),
    /// Never started because the batch had already stopped admitting.
    Skipped,
}

impl DownloadEngine {
    /// Downloads a batch of payloads into `cachedir`, up to
    /// `parallel_downloads` at a time.
    ///
    /// Returns `Ok(())` when every required payload either downloaded or
    /// was already up to date; otherwise the first fatal error. Optional
    /// payloads (`errors_ok`) never fail the batch.
    pub async fn download_all(&self, payloads: &mut [Payload], cachedir: &Path) -> Result<()> {
        if let Some(fetch) = self.config.fetch.clone() {
            for payload in payloads.iter_mut() {
                let mut success = false;
                for idx in 0..payload.servers.len() {
                    payload.state.server_idx = idx;
                    let Some(url) = payload.rebuild_fileurl().map(str::to_string) else {
                        continue;
                    };
                    if fetch(&url, cachedir, payload.force).is_some() {
                        success = true;
                        break;
                    }
                }
                if !success && !payload.errors_ok {
                    return Err(Error::ExternalDownload);
                }
            }
            return Ok(());
        }

        let halted = AtomicBool::new(false);
        let mut first_error = None;

        let outcomes: Vec<MultiOutcome> = stream::iter(payloads.iter_mut().map(|payload| {
            let halted = &halted;
            async move {
                if halted.load(Ordering::SeqCst) {
                    return MultiOutcome::Skipped;
                }
                let outcome = self.multi_transfer(payload, cachedir).await;
                if matches!(outcome, MultiOutcome::Failed(_)) {
                    // a required payload failed: stop admitting new work,
                    // but let transfers already in flight finish
                    halted.store(true, Ordering::SeqCst);
                }
                outcome
            }
        }))
        .buffer_unordered(self.config.effective_parallel())
        .collect()
        .await;

        for outcome in outcomes {
            match outcome {
                MultiOutcome::Failed(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                MultiOutcome::Done | MultiOutcome::OptionalFailed | MultiOutcome::Skipped => {}
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Runs one payload to completion, failing over across its mirrors.
    async fn multi_transfer(&self, payload: &mut Payload, cachedir: &Path) -> MultiOutcome {
        // admission: compose the URL, settle names, open the part file
        let url = match attempt_url(payload) {
            Ok(url) => url,
            Err(err) => {
                error!(
                    "failed to setup a download payload for {}",
                    payload.remote_name()
                );
                return MultiOutcome::Failed(err);
            }
        };
        payload.ensure_remote_name();

        if let Err(err) = urls::host_from_url(&url) {
            error!("url '{url}' is invalid");
            return MultiOutcome::Failed(err);
        }

        let mut file_slot = match assign_names(payload, cachedir, false).await {
            Ok(slot) => slot,
            Err(err) => {
                error!(
                    "failed to setup a download payload for {}",
                    payload.remote_name()
                );
                return MultiOutcome::Failed(err);
            }
        };

        debug!("{}: url is {url}", payload.remote_name());
        if payload.max_size > 0 {
            debug!("{}: maxsize {}", payload.remote_name(), payload.max_size);
        }
        let mut plan = plan_transfer(payload);

        if payload.max_size > 0 && payload.state.initial_size == payload.max_size {
            debug!("{}: part file is complete", payload.remote_name());
            self.emit_init(payload);
            file_slot = None;
            return match publish_attempt(payload, &mut file_slot, None).await {
                Ok(_) => {
                    self.emit_completed(payload, 0, 0);
                    MultiOutcome::Done
                }
                Err(err) => {
                    self.emit_completed(payload, 0, -1);
                    self.demote_if_optional(payload, err)
                }
            };
        }

        if file_slot.is_none() {
            let temp = match tempfile_path(payload) {
                Ok(temp) => temp,
                Err(err) => return MultiOutcome::Failed(err),
            };
            match partfile::open_part(&temp, payload.state.open_mode).await {
                Ok(file) => {
                    debug!(
                        "{}: opened tempfile for download: {} ({:?})",
                        payload.remote_name(),
                        temp.display(),
                        payload.state.open_mode
                    );
                    file_slot = Some(file);
                }
                Err(err) => {
                    error!("could not open file {}: {err}", temp.display());
                    return MultiOutcome::Failed(err);
                }
            }
        }

        self.emit_init(payload);

        let mut url = url;
        loop {
            let host = match urls::host_from_url(&url) {
                Ok(host) => host.to_string(),
                Err(err) => return MultiOutcome::Failed(err),
            };

            let session = Session {
                client: &self.client,
                interrupt: &self.interrupt,
                events: self.config.events.as_ref(),
                disable_timeout: self.config.disable_download_timeout,
            };
            let result = match file_slot.as_mut() {
                Some(file) => session.run(payload, &plan, &url, file).await,
                None => {
                    return MultiOutcome::Failed(Error::System {
                        source: std::io::Error::other("part file not open"),
                    })
                }
            };

            match assess_attempt(payload, result, &mut file_slot, &host).await {
                AttemptVerdict::Success(outcome) => {
                    if payload.trust_remote_name {
                        retarget_destination(payload, &outcome, cachedir);
                    }
                    return match publish_attempt(payload, &mut file_slot, outcome.remote_time)
                        .await
                    {
                        Ok(_) => {
                            self.emit_completed(payload, outcome.bytes_downloaded, 0);
                            MultiOutcome::Done
                        }
                        Err(err) => {
                            finalize_failure(payload, &mut file_slot, None).await;
                            self.emit_completed(payload, outcome.bytes_downloaded, -1);
                            self.demote_if_optional(payload, err)
                        }
                    };
                }
                AttemptVerdict::UpToDate => {
                    drop(file_slot.take());
                    if let Some(temp) = payload.state.tempfile_name.clone() {
                        partfile::unlink(&temp).await;
                    }
                    self.emit_completed(payload, 0, 1);
                    return MultiOutcome::Done;
                }
                AttemptVerdict::Failed {
                    error,
                    recoverable,
                    remote_time,
                    bytes,
                } => {
                    if recoverable && payload.advance_server() {
                        match self.prepare_retry(payload, &mut file_slot, &mut plan).await {
                            Ok(next_url) => {
                                url = next_url;
                                continue;
                            }
                            Err(err) => {
                                finalize_failure(payload, &mut file_slot, remote_time).await;
                                self.emit_completed(payload, bytes, -1);
                                return self.demote_if_optional(payload, err);
                            }
                        }
                    }
                    if recoverable {
                        debug!("{}: no more servers to retry", payload.remote_name());
                    }
                    finalize_failure(payload, &mut file_slot, remote_time).await;
                    self.emit_completed(payload, bytes, -1);
                    return self.demote_if_optional(payload, error);
                }
            }
        }
    }

    /// Points the payload at the mirror `advance_server` just selected:
    /// rebuilds the URL and, when the temp file is fail-discarded, drops
    /// the bytes the failed mirror left behind.
    async fn prepare_retry(
        &self,
        payload: &mut Payload,
        file_slot: &mut Option<tokio::fs::File>,
        plan: &mut TransferPlan,
    ) -> Result<String> {
        let url = payload
            .rebuild_fileurl()
            .map(str::to_string)
            .ok_or(Error::ServerNone)?;

        if payload.state.unlink_on_fail {
            if let Some(file) = file_slot.as_mut() {
                partfile::truncate_for_retry(file).await?;
            }
            payload.state.initial_size = 0;
            plan.resume_from = 0;
        } else if let Some(file) = file_slot.as_ref() {
            // keep whatever the failed mirror delivered and continue after
            // it; mirrors serve identical artifacts
            let len = file.metadata().await.map_err(Error::from)?.len();
            plan.resume_from = len;
            payload.state.initial_size = len;
        }
        payload.state.respcode = 0;

        debug!("{}: retrying from {url}", payload.remote_name());
        Ok(url)
    }

    fn demote_if_optional(&self, payload: &Payload, error: Error) -> MultiOutcome {
        // interrupts are never demoted; an optional payload can still
        // tolerate any other failure
        if payload.errors_ok && !matches!(error, Error::Cancelled) {
            MultiOutcome::OptionalFailed
        } else {
            MultiOutcome::Failed(error)
        }
    }
}
