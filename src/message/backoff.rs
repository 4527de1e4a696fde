use std::{iter::Take, time::Duration};

/// Provides a mechanism for managing attempting to complete an operation
/// and retrying the operation, with a backoff, if it fails.
///
/// This iterator provides an infinite stream of back off durations, where
/// the duration increases by an exponential factor up to some maximum delay.
/// Upon reaching the maximum delay, that value will be returned from then
/// on.
pub struct ExponentialBackoff {
    curr: Duration,
    max: Duration,
    factor: u32,
}

impl ExponentialBackoff {
    pub fn new(start: Duration, max: Duration, factor: u32) -> ExponentialBackoff {
        ExponentialBackoff {
            curr: start,
            max,
            factor,
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let curr = self.curr;
        self.curr = (self.curr * self.factor).min(self.max);
        Some(curr)
    }
}

/// The Retry trait provides a protocol for retrying a fallible function
/// until either it succeeds or the delay iterator completes. The function
/// is attempted once per delay; the sleep callback runs between attempts
/// (never after the last one) and receives the error that caused it, so the
/// caller can log it. These helpers block the calling thread, so do NOT use
/// them from asynchronous code.
pub trait Retry: Iterator<Item = Duration> {
    fn retry<F, S, T, E>(&mut self, mut f: F, sleep: S) -> Option<Result<T, E>>
    where
        F: FnMut() -> Result<T, E>,
        S: Fn(&E, Duration),
        Self: Sized,
    {
        let mut last_err = None;
        let mut delays = self.peekable();

        while let Some(delay) = delays.next() {
            match f() {
                Ok(v) => return Some(Ok(v)),
                Err(e) => {
                    if delays.peek().is_some() {
                        sleep(&e, delay);
                    }
                    last_err = Some(Err(e));
                }
            }
        }
        last_err
    }
}

impl Retry for ExponentialBackoff {}

impl Retry for Take<ExponentialBackoff> {}
