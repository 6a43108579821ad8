//! A background thread that periodically re-fetches flag definitions and installs them in a
//! [`DefinitionStore`].
use std::{
    sync::{mpsc::RecvTimeoutError, Arc},
    time::Duration,
};

use crate::{definition_store::DefinitionStore, http::FlagsHttpClient, Error, Result};

/// Fetch definitions once and install them. On failure the current snapshot is left untouched.
pub(crate) fn refresh_definitions(
    fetcher: &FlagsHttpClient,
    store: &DefinitionStore,
) -> Result<()> {
    let definitions = fetcher.fetch_definitions().inspect_err(|err| {
        log::warn!(target: "mixpanel_flags", "failed to fetch flag definitions: {}", err);
    })?;
    store.set_definitions(definitions);
    Ok(())
}

/// A definitions poller thread.
///
/// Use [`LocalFlagsProvider::start_polling`](crate::LocalFlagsProvider::start_polling) to start
/// one.
///
/// Stopping the thread prevents further fetches but does not abort a request that is already in
/// flight; its result is still installed.
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the poller thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,
}

impl PollerThread {
    /// Start the thread. The first fetch happens one `interval` after start; the caller is
    /// expected to have performed the initial fetch itself.
    ///
    /// # Errors
    ///
    /// IO Error if the poller thread failed to start.
    pub(crate) fn start(
        fetcher: Arc<FlagsHttpClient>,
        store: Arc<DefinitionStore>,
        interval: Duration,
    ) -> std::io::Result<PollerThread> {
        // Using `sync_channel` here as it makes `stop_sender` `Sync`. Buffer size of 1 is enough:
        // a second stop command can be dropped as the thread stops anyway.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let join_handle = std::thread::Builder::new()
            .name("mixpanel-flags-poller".to_owned())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| loop {
                    match stop_receiver.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            log::debug!(target: "mixpanel_flags", "polling flag definitions");
                            // Failures are logged inside and the previous snapshot is kept.
                            let _ = refresh_definitions(&fetcher, &store);
                        }
                        Ok(()) => {
                            log::debug!(target: "mixpanel_flags", "poller thread received stop command");
                            return;
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            log::debug!(target: "mixpanel_flags", "poller thread handle dropped, stopping");
                            return;
                        }
                    }
                }));

                if result.is_err() {
                    log::error!(target: "mixpanel_flags", "poller thread panicked, definitions will no longer refresh");
                }
            })?;

        Ok(PollerThread {
            join_handle,
            stop_sender,
        })
    }

    /// Stop the poller thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        // Error means that the receiver was dropped (thread exited) or the buffer is full
        // (another stop command is pending). Either way the thread stops.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// # Errors
    ///
    /// - [`Error::PollerThreadPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        self.stop();

        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)?;

        Ok(())
    }
}
