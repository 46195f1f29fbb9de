//! Inference thread
//!
//! The model lives on a dedicated thread. Callers wait for each result with
//! a deadline; a result that arrives after its caller gave up is dropped when
//! the next call drains the channel.

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use ndarray::Array4;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::SuperResolutionModel;

struct Request {
    id: u64,
    input: Array4<f32>,
}

struct Response {
    id: u64,
    result: Result<Array4<f32>>,
}

/// Handle to a model running on its own thread
pub struct InferenceWorker {
    requests: Option<Sender<Request>>,
    responses: Receiver<Response>,
    next_id: u64,
    thread: Option<JoinHandle<()>>,
}

impl InferenceWorker {
    /// Move a model onto a new inference thread
    pub fn spawn(mut model: Box<dyn SuperResolutionModel>) -> Result<Self> {
        // One queued request at most; a caller that timed out does not pile up work
        let (request_tx, request_rx) = bounded::<Request>(1);
        let (response_tx, response_rx) = unbounded::<Response>();

        let thread = std::thread::Builder::new()
            .name("sr-inference".into())
            .spawn(move || {
                for request in request_rx.iter() {
                    let result = model.run(request.input);
                    let response = Response {
                        id: request.id,
                        result,
                    };
                    if response_tx.send(response).is_err() {
                        break;
                    }
                }
                tracing::debug!("Inference thread exiting");
            })?;

        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            next_id: 0,
            thread: Some(thread),
        })
    }

    /// Run one batch, waiting at most `timeout` for queueing plus inference.
    ///
    /// A timeout is a per-frame `FrameTransform` error.
    pub fn run(&mut self, input: Array4<f32>, timeout: Duration) -> Result<Array4<f32>> {
        let deadline = Instant::now() + timeout;
        let id = self.next_id;
        self.next_id += 1;

        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| Error::FrameTransform("inference thread stopped".into()))?;

        requests
            .send_timeout(Request { id, input }, timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => Error::FrameTransform(format!(
                    "inference thread still busy after {:?}",
                    timeout
                )),
                SendTimeoutError::Disconnected(_) => {
                    Error::FrameTransform("inference thread stopped".into())
                }
            })?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) if response.id == id => {
                    return response.result.map_err(|e| match e {
                        Error::FrameTransform(_) => e,
                        other => Error::FrameTransform(other.to_string()),
                    })
                }
                Ok(stale) => {
                    tracing::debug!("Discarding late inference result #{}", stale.id);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(Error::FrameTransform(format!(
                        "inference exceeded {:?}",
                        timeout
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::FrameTransform("inference thread stopped".into()))
                }
            }
        }
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        // Closing the queue ends the thread once any in-flight call returns
        self.requests = None;
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                let _ = thread.join();
            }
        }
    }
}
