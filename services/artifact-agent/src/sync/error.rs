use nimbus_coordination::StoreError;
use nimbus_id::JobId;
use thiserror::Error;

use super::fetcher::FetchError;

/// Failure installing a single job.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no assignment for job {0}")]
    AssignmentMissing(JobId),

    #[error("coordination store error: {0}")]
    Coordination(#[from] StoreError),

    #[error("failed to decode assignment for job {job}: {source}")]
    Decode {
        job: JobId,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to fetch {file}: {source}")]
    Fetch {
        file: &'static str,
        #[source]
        source: FetchError,
    },

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used to pick a log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    /// Assignment or artifact is gone; expected while a job is being removed.
    NotFound,
    TransientCoordination,
    TransientTransfer,
    LocalIo,
}

impl SyncError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::AssignmentMissing(_) => SyncErrorKind::NotFound,
            SyncError::Coordination(e) if e.is_not_found() => SyncErrorKind::NotFound,
            SyncError::Coordination(_) | SyncError::Decode { .. } => {
                SyncErrorKind::TransientCoordination
            }
            SyncError::Fetch { source, .. } if source.is_not_found() => SyncErrorKind::NotFound,
            SyncError::Fetch { .. } => SyncErrorKind::TransientTransfer,
            SyncError::Io(_) => SyncErrorKind::LocalIo,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == SyncErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobId {
        JobId::parse("wc-1").unwrap()
    }

    #[test]
    fn test_not_found_kinds() {
        assert!(SyncError::AssignmentMissing(job()).is_not_found());
        assert!(SyncError::Coordination(StoreError::NotFound("/storm/x".into())).is_not_found());
        assert!(SyncError::Fetch {
            file: "stormjar.jar",
            source: FetchError::NotFound("wc-1/stormjar.jar".into()),
        }
        .is_not_found());
    }

    #[test]
    fn test_transient_kinds() {
        assert_eq!(
            SyncError::Coordination(StoreError::Unavailable("down".into())).kind(),
            SyncErrorKind::TransientCoordination
        );
        assert_eq!(
            SyncError::Fetch {
                file: "stormcode.ser",
                source: FetchError::Timeout("wc-1/stormcode.ser".into()),
            }
            .kind(),
            SyncErrorKind::TransientTransfer
        );
        assert_eq!(
            SyncError::Io(std::io::Error::other("disk full")).kind(),
            SyncErrorKind::LocalIo
        );

        let decode = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        assert_eq!(
            SyncError::Decode { job: job(), source: decode }.kind(),
            SyncErrorKind::TransientCoordination
        );
    }
}
