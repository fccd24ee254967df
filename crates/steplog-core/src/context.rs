//! Recording context and the dual-mode call forms.
//!
//! A dual-mode function takes a trailing `&mut Context<'_>` and returns
//! `Result<T, RecordError>`. The context decides, once, whether record
//! operations are live:
//!
//! - a *plain* context carries no record; operations evaluate their value
//!   (or skip it, for the only-when-recording forms) and record nothing;
//! - a *recording* context borrows the active [`Record`] and every operation
//!   writes into it.
//!
//! The context is always passed explicitly. There is no global or
//! thread-local record, so independent call stacks never share state.
//!
//! ```
//! use steplog_core::{call_plain, call_recording, Context, Result, Value};
//!
//! fn double(x: f64, ctx: &mut Context<'_>) -> Result<f64> {
//!     ctx.log("y", x * 2.0)?;
//!     Ok(x)
//! }
//!
//! assert_eq!(call_plain(|ctx| double(3.0, ctx)).unwrap(), 3.0);
//! let record = call_recording(|ctx| double(3.0, ctx)).unwrap();
//! assert_eq!(record.get("y"), Some(&Value::Float(6.0)));
//! ```

use crate::errors::Result;
use crate::record::Record;
use crate::value::ToValue;

/// Whether a record is being accumulated, and if so which one.
///
/// The mode is fixed when the context is built and does not change for the
/// duration of the body it is handed to.
#[derive(Debug)]
pub struct Context<'r> {
    record: Option<&'r mut Record>,
}

impl Context<'static> {
    /// A context in plain mode: nothing is recorded
    pub fn plain() -> Self {
        Self { record: None }
    }
}

impl<'r> Context<'r> {
    /// A context recording into `record`
    pub fn recording(record: &'r mut Record) -> Self {
        Self {
            record: Some(record),
        }
    }

    /// Whether record operations are live
    pub fn is_recording(&self) -> bool {
        self.record.is_some()
    }

    /// The record accumulated so far, if recording
    pub fn record(&self) -> Option<&Record> {
        self.record.as_deref()
    }

    /// Record `value` under `key` and hand it back.
    ///
    /// The value is always computed by the caller; it is only stored when
    /// recording.
    pub fn log<T: ToValue>(&mut self, key: &str, value: T) -> Result<T> {
        self.log_ref(key, &value)?;
        Ok(value)
    }

    /// Record a borrowed value under `key`
    pub fn log_ref<T: ToValue + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        if let Some(record) = self.record.as_deref_mut() {
            record.set(key, value.to_value())?;
            tracing::trace!(key, "recorded value");
        }
        Ok(())
    }

    /// Record several already computed values, inserting in order and
    /// stopping at the first collision.
    pub fn log_all<K, T, I>(&mut self, entries: I) -> Result<()>
    where
        K: AsRef<str>,
        T: ToValue,
        I: IntoIterator<Item = (K, T)>,
    {
        let Some(record) = self.record.as_deref_mut() else {
            return Ok(());
        };
        for (key, value) in entries {
            record.set(key.as_ref(), value.to_value())?;
        }
        Ok(())
    }

    /// Compute and record a value only when recording.
    ///
    /// `compute` is never called in plain mode, which makes this the place
    /// for diagnostics that cost something to produce.
    pub fn only_log<T, F>(&mut self, key: &str, compute: F) -> Result<Option<T>>
    where
        T: ToValue,
        F: FnOnce() -> T,
    {
        if !self.is_recording() {
            return Ok(None);
        }
        self.log(key, compute()).map(Some)
    }

    /// Run a nested dual-mode call and merge its record flat into this one.
    ///
    /// In plain mode `body` runs with a plain context and nothing is merged.
    /// The body's ordinary value is passed through either way.
    pub fn nested<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T>,
    {
        let Some(parent) = self.record.as_deref_mut() else {
            return body(&mut Context::plain());
        };
        let (value, child) = call_traced(body)?;
        tracing::debug!(keys = child.len(), "merging nested record");
        parent.absorb(child)?;
        Ok(value)
    }

    /// Run a nested dual-mode call and merge its record under `key`.
    ///
    /// Calls sharing a sub-key accumulate into the same branch; overlapping
    /// keys inside the branch are a conflict.
    pub fn nested_under<T, F>(&mut self, key: &str, body: F) -> Result<T>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T>,
    {
        let Some(parent) = self.record.as_deref_mut() else {
            return body(&mut Context::plain());
        };
        let (value, child) = call_traced(body)?;
        tracing::debug!(key, keys = child.len(), "merging nested record under sub-key");
        parent.absorb_under(key, child)?;
        Ok(value)
    }

    /// Like [`Context::nested`], but `body` only runs when recording
    pub fn only_nested<T, F>(&mut self, body: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T>,
    {
        if !self.is_recording() {
            return Ok(None);
        }
        self.nested(body).map(Some)
    }

    /// Like [`Context::nested_under`], but `body` only runs when recording
    pub fn only_nested_under<T, F>(&mut self, key: &str, body: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T>,
    {
        if !self.is_recording() {
            return Ok(None);
        }
        self.nested_under(key, body).map(Some)
    }
}

/// Plain form: run `body` without recording and return its value
pub fn call_plain<T, F>(body: F) -> Result<T>
where
    F: FnOnce(&mut Context<'_>) -> Result<T>,
{
    body(&mut Context::plain())
}

/// Recording form: run `body` against a fresh record and return the record.
///
/// A path that executes no record operation yields an empty record.
pub fn call_recording<T, F>(body: F) -> Result<Record>
where
    F: FnOnce(&mut Context<'_>) -> Result<T>,
{
    call_traced(body).map(|(_, record)| record)
}

/// Traced form: run `body` against a fresh record and return both its value
/// and the record
pub fn call_traced<T, F>(body: F) -> Result<(T, Record)>
where
    F: FnOnce(&mut Context<'_>) -> Result<T>,
{
    let mut record = Record::new();
    let value = body(&mut Context::recording(&mut record))?;
    Ok((value, record))
}
