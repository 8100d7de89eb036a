use thiserror::Error;

/// Error type for every composition-time and proxy-time failure
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("No binding and no implicit constructor for component {key}")]
    UnresolvedComponent { key: String },

    #[error("Conflicting binding for {key}: priority {priority} is already taken by {existing}")]
    ConflictingBinding {
        key: String,
        priority: i32,
        existing: String,
    },

    #[error("Unbreakable dependency cycle: {path} (cycle at: {cycle_component})")]
    UnbreakableCycle {
        path: String,
        cycle_component: String,
    },

    #[error("Processing of {key} failed in '{processor}': {message}")]
    Processing {
        key: String,
        processor: String,
        message: String,
    },

    #[error("Proxy invocation of {type_name}::{method} failed: {message}")]
    ProxyInvocation {
        type_name: String,
        method: String,
        message: String,
    },

    #[error("Construction of {key} failed: {source}")]
    ConstructionFailed {
        key: String,
        #[source]
        source: Box<CompositionError>,
    },

    #[error("Type mismatch for {key}: expected {expected}")]
    TypeMismatch { key: String, expected: String },

    #[error("Invalid component key {key}: {message}")]
    InvalidKey { key: String, message: String },

    #[error("Lock error on resource: {resource}")]
    LockError { resource: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Component error: {message}")]
    Component { message: String },
}

impl CompositionError {
    /// Create an unresolved component error
    pub fn unresolved(key: impl ToString) -> Self {
        Self::UnresolvedComponent {
            key: key.to_string(),
        }
    }

    /// Create a processing error raised by the named processor
    pub fn processing(
        key: impl ToString,
        processor: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Processing {
            key: key.to_string(),
            processor: processor.into(),
            message: message.into(),
        }
    }

    /// Create a proxy invocation error
    pub fn proxy_invocation(
        type_name: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ProxyInvocation {
            type_name: type_name.into(),
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create a lock error for the named resource
    pub fn lock(resource: impl Into<String>) -> Self {
        Self::LockError {
            resource: resource.into(),
        }
    }

    /// Free-form error for strategies and user code
    pub fn component(message: impl Into<String>) -> Self {
        Self::Component {
            message: message.into(),
        }
    }

    /// Wrap an error with the key whose construction it interrupted.
    ///
    /// Cycle errors are fatal and pass through unchanged so callers can
    /// still match on them at the top of the resolution.
    pub fn wrap_construction(self, key: impl ToString) -> Self {
        match self {
            Self::UnbreakableCycle { .. } => self,
            other => Self::ConstructionFailed {
                key: key.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Innermost error below any construction wrappers
    pub fn root_cause(&self) -> &CompositionError {
        let mut current = self;
        while let Self::ConstructionFailed { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self.root_cause(), Self::UnresolvedComponent { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConflictingBinding { .. })
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self.root_cause(), Self::UnbreakableCycle { .. })
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.root_cause(), Self::Processing { .. })
    }

    pub fn is_proxy_invocation(&self) -> bool {
        matches!(self.root_cause(), Self::ProxyInvocation { .. })
    }
}

/// Result alias used throughout the crate
pub type CompositionResult<T> = Result<T, CompositionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_wrapping_keeps_root_cause() {
        let error = CompositionError::unresolved("Database")
            .wrap_construction("Repository")
            .wrap_construction("Service");

        assert!(error.is_unresolved());
        assert!(matches!(error, CompositionError::ConstructionFailed { ref key, .. } if key == "Service"));
        assert!(error.to_string().contains("Service"));
    }

    #[test]
    fn test_cycle_errors_are_never_wrapped() {
        let error = CompositionError::UnbreakableCycle {
            path: "A -> B -> A".to_string(),
            cycle_component: "A".to_string(),
        }
        .wrap_construction("B");

        assert!(matches!(error, CompositionError::UnbreakableCycle { .. }));
    }
}
