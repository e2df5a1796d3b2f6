use std::fmt;

use tracing::error;

/// What kind of non-fatal failure a block ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    HeaderConstruction,
    AccountImport,
    TransactionImport,
    SealVerification,
    Mining,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::HeaderConstruction => "header construction",
            FailureKind::AccountImport => "account import",
            FailureKind::TransactionImport => "transaction import",
            FailureKind::SealVerification => "seal verification",
            FailureKind::Mining => "mining",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// Failures that are reported but never abort a test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    failures: Vec<Failure>,
}

impl Report {
    pub fn record(&mut self, kind: FailureKind, message: impl Into<String>) {
        let message = message.into();
        error!(%kind, %message, "Test block failure");
        self.failures.push(Failure { kind, message });
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn has(&self, kind: FailureKind) -> bool {
        self.failures.iter().any(|failure| failure.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}
