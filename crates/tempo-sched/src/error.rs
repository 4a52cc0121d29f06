//! Error types for the scheduling engine.

/// The result type used throughout tempo-sched.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A dependency edge would create a cycle in the job graph.
    #[error("cycle detected: {child} is already upstream of {parent}")]
    CycleDetected {
        /// The parent end of the rejected edge.
        parent: String,
        /// The child end of the rejected edge.
        child: String,
    },

    /// A job was not found in the graph.
    #[error("job not found: {name}")]
    JobNotFound {
        /// The job name that was looked up.
        name: String,
    },

    /// A dependency-based job references a parent that is not registered.
    #[error("unresolvable parent '{parent}' for job '{job}'")]
    UnresolvableParent {
        /// The dependent job.
        job: String,
        /// The missing parent.
        parent: String,
    },

    /// An update attempted to rename a job, which is unsupported.
    #[error("job rename is unsupported: '{from}' -> '{to}'")]
    RenameUnsupported {
        /// The existing name.
        from: String,
        /// The attempted replacement name.
        to: String,
    },

    /// A job definition failed validation.
    #[error("invalid job '{name}': {message}")]
    InvalidJob {
        /// The offending job name.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// A mutating operation was invoked on a replica that is not the leader.
    #[error("not the leader: {operation} requires leadership")]
    NotLeader {
        /// The refused operation.
        operation: &'static str,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The coordination service failed; treated as fatal by callers.
    #[error("coordination error: {message}")]
    Coordination {
        /// Description of the coordination failure.
        message: String,
    },

    /// State hydration failed on election; fatal for the process.
    #[error("hydration failed: {message}")]
    Hydration {
        /// Description of the hydration failure.
        message: String,
    },

    /// A configuration value was missing or unparseable.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An error from tempo-core.
    #[error("core error: {0}")]
    Core(#[from] tempo_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new coordination error.
    #[must_use]
    pub fn coordination(message: impl Into<String>) -> Self {
        Self::Coordination {
            message: message.into(),
        }
    }

    /// Creates a new hydration error.
    #[must_use]
    pub fn hydration(message: impl Into<String>) -> Self {
        Self::Hydration {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_display() {
        let err = Error::CycleDetected {
            parent: "a".into(),
            child: "b".into(),
        };
        assert!(err.to_string().contains("cycle detected"));
    }

    #[test]
    fn not_leader_display_names_operation() {
        let err = Error::NotLeader {
            operation: "register_jobs",
        };
        assert!(err.to_string().contains("register_jobs"));
    }

    #[test]
    fn core_error_converts() {
        let core = tempo_core::Error::invalid_id("nope");
        let err: Error = core.into();
        assert!(matches!(err, Error::Core(_)));
    }
}
