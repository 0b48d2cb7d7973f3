//! Isolate threads
//!
//! Each submission gets a dedicated OS thread that builds its worker, runs
//! it, and reports how it ended. The dispatcher only ever sees the message
//! channel and the [`Watchdog`] kill switch.

use crate::worker::{IsolateMessage, MessageReceiver, OutputSink, Watchdog, WorkerInit};
use crate::{SandboxLimits, Script, TerminationReason, Worker};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

/// OS stack given to an isolate thread, as a multiple of the interpreter stack limit
const THREAD_STACK_FACTOR: usize = 4;

/// Dispatcher-side handle to a running isolate
///
/// Dropping the handle terminates the isolate.
pub struct IsolateHandle {
    pub id: u64,
    rx: MessageReceiver,
    watchdog: Arc<Watchdog>,
}

impl IsolateHandle {
    /// Next message from the isolate, or `None` once its thread is gone
    pub async fn recv(&mut self) -> Option<IsolateMessage> {
        self.rx.recv().await
    }

    /// Forcibly end the isolate. Further messages are never delivered.
    pub fn terminate(&mut self) {
        self.watchdog.terminate();
        self.rx.close();
    }
}

impl Drop for IsolateHandle {
    fn drop(&mut self) {
        self.watchdog.terminate();
    }
}

/// Spawn an isolate thread running `W` over `script`
pub fn spawn<W: Worker + 'static>(
    id: u64,
    script: Script,
    limits: &SandboxLimits,
) -> Result<IsolateHandle, TerminationReason> {
    let (tx, rx) = mpsc::unbounded_channel();
    let watchdog = Arc::new(Watchdog::new());

    let init = WorkerInit {
        script,
        sink: OutputSink::new(tx.clone(), limits.max_output_lines),
        limits: limits.clone(),
        watchdog: watchdog.clone(),
    };

    thread::Builder::new()
        .name(format!("isolate-{id}"))
        .stack_size(limits.max_stack_bytes() * THREAD_STACK_FACTOR)
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
                let mut worker = W::new(init)?;
                worker.exec()
            }));

            let last = match outcome {
                Ok(Ok(())) => IsolateMessage::Exit { success: true },
                Ok(Err(reason)) => IsolateMessage::Fault(reason.to_string()),
                Err(_) => IsolateMessage::Exit { success: false },
            };
            let _ = tx.send(last);
        })
        .map_err(|e| TerminationReason::IsolateCrash(format!("Failed to spawn isolate: {e}")))?;

    Ok(IsolateHandle { id, rx, watchdog })
}
