use std::{fmt, process::ExitCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Configuration error. Should not retry.
    Configuration,
    /// Non rate-limit RPC failure. Aborts the network's run.
    Transport,
    /// Rate limited on every attempt. Aborts the network's run.
    RetryBudgetExhausted,
    /// A decoded log is missing required fields. The log is skipped.
    MalformedLog,
    /// Read or write failure on persisted artifacts. Aborts the network's run.
    Storage,
    /// Fatal error. Should not retry.
    Fatal,
}

pub type Result<T> = error_stack::Result<T, LedgerError>;

impl error_stack::Context for LedgerError {}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Configuration => f.write_str("ledger error: configuration"),
            LedgerError::Transport => f.write_str("ledger error: transport"),
            LedgerError::RetryBudgetExhausted => {
                f.write_str("ledger error: retry budget exhausted")
            }
            LedgerError::MalformedLog => f.write_str("ledger error: malformed log"),
            LedgerError::Storage => f.write_str("ledger error: storage"),
            LedgerError::Fatal => f.write_str("ledger error: fatal"),
        }
    }
}

pub trait ReportExt {
    fn to_exit_code(&self) -> ExitCode;
}

impl<T> ReportExt for Result<T> {
    fn to_exit_code(&self) -> ExitCode {
        match self {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{:?}", err);
                // Exit codes based on sysexits.h
                match err.current_context() {
                    LedgerError::Configuration => ExitCode::from(78),
                    _ => ExitCode::FAILURE,
                }
            }
        }
    }
}
