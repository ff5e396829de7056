//! Pipeline runner.
//!
//! Runs plugs strictly in order. A halted request skips every later plug.
//! A panicking plug never reaches the caller: the request is rebuilt from the
//! copy taken before that plug ran, a `plug_crash` record is appended, and the
//! run ends in `Err`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use serde_json::{Value, json};
use tracing::Instrument;

use super::plug::PlugEntry;
use crate::error::ErrorRecord;
use crate::types::{Request, RequestState};

/// Key in `Request::private` holding the executed plugs and their timings
pub const TRACE_KEY: &str = "pipeline.trace";

/// Run `request` through `plugs`.
///
/// Returns `Err` when the run ends in [`RequestState::Error`], a plug
/// panicked, or a plug halted with a new error after the request had already
/// completed. `Ok` otherwise. Either way the caller gets the request back with
/// its full error history.
#[allow(clippy::result_large_err)]
pub async fn run(request: Request, plugs: &[PlugEntry]) -> Result<Request, Request> {
    let span = tracing::info_span!(
        "pipeline.run",
        request_id = %request.id(),
        provider = %request.provider(),
    );
    run_inner(request, plugs).instrument(span).await
}

#[allow(clippy::result_large_err)]
async fn run_inner(request: Request, plugs: &[PlugEntry]) -> Result<Request, Request> {
    let mut request = request.update_metadata(|m| m.mark_started());
    let mut crashed = false;
    let mut failed_after_completion = false;

    for entry in plugs {
        if request.is_halted() {
            tracing::debug!(plug = entry.name(), "request halted, skipping remaining plugs");
            break;
        }

        let name = entry.name().to_string();
        let before = request.snapshot();
        let errors_before = request.errors().len();
        let started = Instant::now();

        let outcome = AssertUnwindSafe(entry.plug.call(request, &entry.options))
            .catch_unwind()
            .await;
        let elapsed_us = started.elapsed().as_micros() as u64;

        request = match outcome {
            Ok(next) => next,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(plug = %name, %message, "Stage {} failed: plug panicked", name);
                crashed = true;
                before.halt_with_error(ErrorRecord::plug_crash(&name, message))
            }
        };
        if request.state() == RequestState::Completed
            && request.is_halted()
            && request.errors().len() > errors_before
        {
            tracing::warn!(plug = %name, "plug halted with an error after completion");
            failed_after_completion = true;
        }
        request = append_trace(request, &name, elapsed_us);

        tracing::debug!(
            plug = %name,
            elapsed_us,
            state = %request.state(),
            halted = request.is_halted(),
            errors = request.errors().len(),
            "stage finished"
        );
    }

    let request = request.update_metadata(|m| m.mark_ended());
    if crashed || failed_after_completion || request.state() == RequestState::Error {
        if let Some(last) = request.errors().last() {
            tracing::warn!(kind = %last.kind, plug = ?last.plug, "pipeline ended in error: {}", last.message);
        }
        Err(request)
    } else {
        Ok(request)
    }
}

fn append_trace(request: Request, plug: &str, elapsed_us: u64) -> Request {
    let mut trace = match request.private().get(TRACE_KEY) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    trace.push(json!({ "plug": plug, "elapsed_us": elapsed_us }));
    request.put_private(TRACE_KEY, Value::Array(trace))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "plug panicked with a non-string payload".to_string()
    }
}
