use std::path::PathBuf;

use thiserror::Error;

use crate::bigquery::{auth::AuthError, client::QueryError};

/// Outcome of a sync step.  Every variant ends the run with a non-zero exit.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to authenticate with default credentials: {0}")]
    Auth(#[from] AuthError),

    #[error("BigQuery query failed: {0}")]
    Query(#[from] QueryError),

    #[error("No data found in BigQuery table {0}")]
    EmptyResult(String),

    #[error("Failed to update local file, could not {action} {}: {source}", .path.display())]
    Persist {
        action: PersistAction,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistAction {
    CreateDir,
    Backup,
    Serialize,
    Write,
}

impl std::fmt::Display for PersistAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use PersistAction::*;
        match self {
            CreateDir => write!(f, "create directory"),
            Backup => write!(f, "back up"),
            Serialize => write!(f, "serialize document for"),
            Write => write!(f, "write"),
        }
    }
}

impl SyncError {
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// A remediation the user can run, if there is an obvious one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            SyncError::Auth(_) => Some("Run: gcloud auth application-default login"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn every_failure_exits_with_one() {
        let errors = vec![
            SyncError::Auth(AuthError::NoCredentials),
            SyncError::Query(QueryError::MissingColumn("json_data".into())),
            SyncError::EmptyResult("p.d.t".into()),
            SyncError::Persist {
                action: PersistAction::Write,
                path: PathBuf::from("data/tokens-data.json"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            },
        ];
        for e in errors {
            assert_eq!(e.exit_code(), 1);
        }
    }

    #[test]
    fn only_auth_failures_carry_a_hint() {
        let e = SyncError::Auth(AuthError::NoCredentials);
        assert_eq!(e.hint(), Some("Run: gcloud auth application-default login"));
        assert_eq!(SyncError::EmptyResult("p.d.t".into()).hint(), None);
    }

    #[test]
    fn persist_message_names_the_step() {
        let e = SyncError::Persist {
            action: PersistAction::Backup,
            path: PathBuf::from("data/tokens-data.json"),
            source: io::Error::new(io::ErrorKind::Other, "boom"),
        };
        assert_eq!(
            e.to_string(),
            "Failed to update local file, could not back up data/tokens-data.json: boom"
        );
    }
}
