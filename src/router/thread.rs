// SPDX-FileCopyrightText: The midimux authors
// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable, Aborted};
use tokio::time::MissedTickBehavior;

use super::Router;
use crate::{DinLine, UsbEndpoint};

/// Upper bound for consecutive passes per tick.
///
/// Passes stop earlier once a pass moves no data. Transports that
/// deliver data without pause are served again on the next tick.
const MAX_PASSES_PER_TICK: usize = 64;

/// Dedicated thread that drives a [`Router`].
///
/// Each tick runs passes until no more input is available.
#[derive(Debug)]
pub struct RouterThread<U, D> {
    abort_handle: AbortHandle,
    os_thread: std::thread::JoinHandle<Router<U, D>>,
}

impl<U, D> RouterThread<U, D>
where
    U: UsbEndpoint + Send + 'static,
    D: DinLine + Send + 'static,
{
    #[must_use]
    pub fn spawn(mut router: Router<U, D>, tick_period: Duration) -> Self {
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let os_thread = std::thread::spawn(move || {
            log::info!("Entering router thread");
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    log::error!("Failed to create Tokio runtime: {err}");
                    return router;
                }
            };
            let abortable_task = Abortable::new(run(&mut router, tick_period), abort_registration);
            runtime.block_on(async move {
                log::info!("Running router");
                match abortable_task.await {
                    Ok(()) => {
                        log::info!("Router terminated");
                    }
                    Err(Aborted) => {
                        log::info!("Router aborted");
                    }
                }
            });
            log::info!("Exiting router thread");
            router
        });
        Self {
            abort_handle,
            os_thread,
        }
    }

    /// Stop the thread and take back the router.
    pub fn abort_and_join(self) -> anyhow::Result<Router<U, D>> {
        let Self {
            abort_handle,
            os_thread,
        } = self;
        abort_handle.abort();
        os_thread
            .join()
            .map_err(|err| anyhow::anyhow!("Router thread panicked: {err:?}"))
    }
}

async fn run<U, D>(router: &mut Router<U, D>, tick_period: Duration)
where
    U: UsbEndpoint,
    D: DinLine,
{
    let mut interval = tokio::time::interval(tick_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        for _ in 0..MAX_PASSES_PER_TICK {
            if router.run_pass() == 0 {
                break;
            }
        }
    }
}
