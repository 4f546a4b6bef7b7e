//! Fetching a package by URL, with its detached-signature companion.
//!
//! This is the composition layer over the single-transfer driver: check the
//! file cache first, download the package with resume and trusted renaming,
//! then fetch `<url>.sig` under a hard size cap when the engine's signature
//! policy asks for one. Signature verification itself is someone else's
//! job; this module only places the file next to the package.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::cache::FileCache;
use crate::engine::{DownloadEngine, SigPolicy};
use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::utils::urls;

/// Hard upper limit for detached signature files.
const SIG_MAX_SIZE: u64 = 16 * 1024;

/// Downloads `url` into the cache, returning the path of the cached file.
///
/// A file already present in the cache is returned as-is without touching
/// the network. On a fresh download the destination name follows server
/// hints (Content-Disposition, effective URL), and a `.sig` companion is
/// fetched according to the engine's [`SigPolicy`].
pub async fn fetch_package_url(
    engine: &DownloadEngine,
    cache: &dyn FileCache,
    url: &str,
) -> Result<PathBuf> {
    let basename = urls::filename_from_url(url);
    if let Some(cached) = cache.find(basename) {
        return Ok(cached);
    }

    let mut payload = Payload::from_url(url)
        .with_resume(true)
        .with_trust_remote_name(true);

    let transfer = match engine.download(&mut payload, cache.cachedir()).await {
        Ok(transfer) => transfer,
        Err(err) => {
            warn!("failed to download {url}");
            return Err(err);
        }
    };
    debug!("successfully downloaded {url}");

    if engine.sig_policy() != SigPolicy::Never {
        let final_url = transfer.effective_url.as_deref().unwrap_or(url);
        let sig_url = format!("{final_url}.sig");

        if cache.find(urls::filename_from_url(&sig_url)).is_none() {
            let errors_ok = engine.sig_policy() == SigPolicy::Optional;
            let mut sig_payload = Payload::from_url(&sig_url)
                .as_signature()
                .with_trust_remote_name(true)
                .with_force(true)
                .with_errors_ok(errors_ok)
                .with_max_size(SIG_MAX_SIZE);

            match engine.download(&mut sig_payload, cache.cachedir()).await {
                Ok(_) => debug!("successfully downloaded {sig_url}"),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    if errors_ok {
                        // the missing signature will be noticed at package
                        // load time; only warn here
                        warn!("failed to download {sig_url}");
                    } else {
                        warn!("failed to download {sig_url}");
                        return Err(err);
                    }
                }
            }
        }
    }

    // the file is findable through the cache now that it is published
    let final_file = transfer.final_file.as_deref().unwrap_or(basename);
    cache
        .find(final_file)
        .ok_or_else(|| Error::Retrieve {
            reason: format!("downloaded file {final_file} not found in cache"),
        })
}
