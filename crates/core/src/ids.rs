use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.0.to_string()[..8])
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// A scope is one attendance session or one gradebook period x assignment.
uuid_id!(ScopeId);
// Enrollments, achievements, dates: anything a cell key is built from.
uuid_id!(EntityId);
uuid_id!(ActorId);

/// Composite key of one editable cell.
///
/// `subject` is the row entity (an enrollment); `fact` is the column entity
/// (an achievement or a class date). Grants are scoped by `subject`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub subject: EntityId,
    pub fact: EntityId,
}

impl CellKey {
    pub fn new(subject: EntityId, fact: EntityId) -> Self {
        Self { subject, fact }
    }
}

impl fmt::Debug for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CellKey({}x{})",
            &self.subject.as_uuid().to_string()[..8],
            &self.fact.as_uuid().to_string()[..8]
        )
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.fact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
        assert_eq!(EntityId::from_bytes(*a.as_bytes()), a);
    }

    #[test]
    fn cell_key_orders_by_subject_then_fact() {
        let s1 = EntityId::from_bytes([1; 16]);
        let s2 = EntityId::from_bytes([2; 16]);
        let f1 = EntityId::from_bytes([1; 16]);
        let f9 = EntityId::from_bytes([9; 16]);
        assert!(CellKey::new(s1, f9) < CellKey::new(s2, f1));
        assert!(CellKey::new(s1, f1) < CellKey::new(s1, f9));
    }

    #[test]
    fn debug_is_abbreviated() {
        let id = ScopeId::from_bytes([0xab; 16]);
        assert_eq!(format!("{id:?}"), "ScopeId(abababab)");
    }
}
