//! Module `id` provides the injected collaborator responsible for
//! minting process-unique document identifiers. The store never parses
//! or interprets identifier bits; callers must treat them as opaque.

use uuid::Uuid;

/// Produces process-unique, opaque string identifiers. Implementations
/// must never repeat an identifier for the lifetime of the process.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Default generator, backed by random (v4) UUIDs.
#[derive(Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
