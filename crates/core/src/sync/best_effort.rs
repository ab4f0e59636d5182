//! Result of work whose failure is recorded but never propagated.

use crate::errors::{Error, Result};

/// Either the value, or the error that was logged and dropped.
#[derive(Debug)]
#[must_use]
pub enum BestEffort<T> {
    Done(T),
    Failed(Error),
}

impl<T> BestEffort<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Error> {
        match self {
            Self::Done(_) => None,
            Self::Failed(err) => Some(err),
        }
    }
}

impl<T> From<Result<T>> for BestEffort<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Done(value),
            Err(err) => Self::Failed(err),
        }
    }
}
