//! Session identifier generation

use crate::error::{Error, ErrorKind, Result};
use rand::TryRngCore;
use rand::rngs::OsRng;
use std::sync::Arc;

/// Number of random bytes behind every generated id
pub const SESSION_ID_BYTES: usize = 24;

/// Type alias for session ID generator function
///
/// This is a thread-safe function that generates unique session IDs.
/// Generation may fail: handing out a predictable id is never acceptable,
/// so a broken random source surfaces as [`ErrorKind::IdGeneration`].
///
/// # Examples
///
/// ```
/// use sessio::web::id::SessionIdGenerator;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// // Sequential generator (for testing)
/// let counter = Arc::new(AtomicU64::new(0));
/// let sequential: SessionIdGenerator = Arc::new(move || {
///     let id = counter.fetch_add(1, Ordering::SeqCst);
///     Ok::<_, sessio::error::Error>(format!("session-{id}"))
/// });
/// assert_eq!(sequential().unwrap(), "session-0");
/// ```
pub type SessionIdGenerator = Arc<dyn Fn() -> Result<String> + Send + Sync>;

/// Create the default generator: 24 bytes from the OS CSPRNG, hex encoded
///
/// # Examples
///
/// ```
/// use sessio::web::id::default_session_id_generator;
///
/// let generator = default_session_id_generator();
/// let id = generator().unwrap();
/// assert_eq!(id.len(), 48);
/// ```
#[must_use]
pub fn default_session_id_generator() -> SessionIdGenerator {
    Arc::new(generate_id)
}

/// Draw a fresh random identifier
pub fn generate_id() -> Result<String> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        Error::new(ErrorKind::IdGeneration, "OS random source unavailable").with_source(e)
    })?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_shape() {
        let id = generate_id().unwrap();
        assert_eq!(id.len(), SESSION_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_distinct() {
        let generator = default_session_id_generator();
        let ids: HashSet<String> = (0..1000).map(|_| generator().unwrap()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
