use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use crate::StopSignal;

/// Named background thread tied to its own [`StopSignal`].
///
/// Dropping the handle raises the signal and joins the thread.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    stop: Arc<StopSignal>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn<F>(name: impl Into<String>, body: F) -> io::Result<Self>
    where
        F: FnOnce(Arc<StopSignal>) + Send + 'static,
    {
        let name = name.into();
        let stop = Arc::new(StopSignal::new());
        let thread_stop = Arc::clone(&stop);
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(thread_stop))?;
        debug!("started worker {name}");
        Ok(Self {
            name,
            stop,
            join: Some(join),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop_signal(&self) -> &Arc<StopSignal> {
        &self.stop
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Raise the stop signal and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("worker {} panicked", self.name);
            } else {
                debug!("worker {} stopped", self.name);
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
