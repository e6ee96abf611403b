//! Reversible operation log with reverse-order rollback.
//!
//! Every side effect of the install and start steps is recorded as an
//! [`Operation`]: a forward action paired with the inverse that undoes it.
//! When an operation fails, everything committed before it is undone in
//! strict reverse order. Rollback failures are logged and collected, never
//! raised, so a broken inverse cannot hide the original failure.
//!
//! A failure while cancellation is pending is not rolled back: the committed
//! work stays in place for a later resume.

use serde::Serialize;
use tracing::{debug, warn};

type Action<'a> = Box<dyn FnOnce() -> anyhow::Result<()> + 'a>;

pub struct Operation<'a> {
    name: String,
    forward: Action<'a>,
    inverse: Option<Action<'a>>,
}

impl<'a> Operation<'a> {
    pub fn new<F, I>(name: impl Into<String>, forward: F, inverse: I) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + 'a,
        I: FnOnce() -> anyhow::Result<()> + 'a,
    {
        Self {
            name: name.into(),
            forward: Box::new(forward),
            inverse: Some(Box::new(inverse)),
        }
    }

    /// Operation with nothing to undo (waits, checks).
    pub fn irreversible<F>(name: impl Into<String>, forward: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + 'a,
    {
        Self {
            name: name.into(),
            forward: Box::new(forward),
            inverse: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Operation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("reversible", &self.inverse.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationFailure {
    pub operation: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionReport {
    /// Operations whose forward action succeeded, in execution order.
    pub executed: Vec<String>,
    /// Operations undone, in rollback order.
    pub rolled_back: Vec<String>,
    pub rollback_errors: Vec<OperationFailure>,
    pub failure: Option<OperationFailure>,
}

impl TransactionReport {
    pub fn is_clean_rollback(&self) -> bool {
        self.rollback_errors.is_empty()
    }
}

struct Committed<'a> {
    name: String,
    inverse: Option<Action<'a>>,
}

pub struct InstallationTransaction<'a> {
    label: String,
    committed: Vec<Committed<'a>>,
    report: TransactionReport,
    poisoned: bool,
    interrupted: bool,
    cancelled: Option<Box<dyn Fn() -> bool + 'a>>,
}

impl<'a> InstallationTransaction<'a> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            committed: Vec::new(),
            report: TransactionReport::default(),
            poisoned: false,
            interrupted: false,
            cancelled: None,
        }
    }

    /// Consult `cancelled` when an operation fails; if it reports true the
    /// failure is recorded but nothing is rolled back.
    pub fn with_cancellation(mut self, cancelled: impl Fn() -> bool + 'a) -> Self {
        self.cancelled = Some(Box::new(cancelled));
        self
    }

    /// Take over work an earlier run committed, so a failure here undoes it too.
    pub fn adopt<I>(&mut self, name: impl Into<String>, inverse: I)
    where
        I: FnOnce() -> anyhow::Result<()> + 'a,
    {
        let name = name.into();
        debug!(transaction = %self.label, operation = %name, "adopted committed operation");
        self.committed.push(Committed {
            name,
            inverse: Some(Box::new(inverse)),
        });
    }

    /// Run `op`. Returns `false` when it failed (or the transaction is already
    /// poisoned), in which case all committed work has been rolled back unless
    /// [`is_interrupted`](Self::is_interrupted) reports otherwise.
    pub fn execute_operation(&mut self, op: Operation<'a>) -> bool {
        if self.poisoned {
            warn!(
                transaction = %self.label,
                operation = %op.name,
                "refusing operation on a rolled-back transaction"
            );
            return false;
        }

        debug!(transaction = %self.label, operation = %op.name, "executing operation");
        match (op.forward)() {
            Ok(()) => {
                self.report.executed.push(op.name.clone());
                self.committed.push(Committed {
                    name: op.name,
                    inverse: op.inverse,
                });
                true
            }
            Err(err) => {
                let message = format!("{err:#}");
                self.report.failure = Some(OperationFailure {
                    operation: op.name.clone(),
                    message: message.clone(),
                });
                if self.cancelled.as_ref().is_some_and(|cancelled| cancelled()) {
                    warn!(
                        transaction = %self.label,
                        operation = %op.name,
                        error = %message,
                        "operation failed after cancellation; keeping committed work"
                    );
                    self.interrupted = true;
                    return false;
                }
                warn!(
                    transaction = %self.label,
                    operation = %op.name,
                    error = %message,
                    "operation failed, rolling back"
                );
                self.rollback();
                false
            }
        }
    }

    /// Undo every committed operation, newest first, and poison the transaction.
    pub fn rollback(&mut self) {
        self.poisoned = true;
        while let Some(entry) = self.committed.pop() {
            let Some(inverse) = entry.inverse else {
                debug!(operation = %entry.name, "nothing to undo");
                continue;
            };
            match inverse() {
                Ok(()) => {
                    debug!(operation = %entry.name, "rolled back");
                    self.report.rolled_back.push(entry.name);
                }
                Err(err) => {
                    warn!(
                        transaction = %self.label,
                        operation = %entry.name,
                        error = %format!("{err:#}"),
                        "rollback action failed"
                    );
                    self.report.rollback_errors.push(OperationFailure {
                        operation: entry.name,
                        message: format!("{err:#}"),
                    });
                }
            }
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// The last failure happened under cancellation and was not rolled back.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn report(&self) -> &TransactionReport {
        &self.report
    }

    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    /// Accept the work; inverses are dropped.
    pub fn commit(self) -> TransactionReport {
        debug!(transaction = %self.label, operations = self.committed.len(), "committed");
        self.report
    }
}
