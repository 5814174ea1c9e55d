//! Global identifier generation.

use tenancy_core::GlobalId;
use uuid::Uuid;

/// Generates global identifiers for records saved without one.
pub trait UniqueIdentifierGenerator: Send + Sync {
    fn generate(&self, model: &str) -> GlobalId;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl UniqueIdentifierGenerator for UuidGenerator {
    fn generate(&self, _model: &str) -> GlobalId {
        GlobalId::new(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_generator_is_unique() {
        let a = UuidGenerator.generate("users");
        let b = UuidGenerator.generate("users");
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }
}
