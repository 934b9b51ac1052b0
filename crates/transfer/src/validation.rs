use chunkwise_protocol::Session;

use crate::TransferError;
use crate::source::DataSource;

/// Checks that `source` is the file `session` was created for.
///
/// Name and size must both match. A rejected source leaves the session
/// untouched; the caller is expected to prompt for the right file again.
pub fn validate_source(session: &Session, source: &dyn DataSource) -> Result<(), TransferError> {
    if source.name() != session.file_name || source.size() != session.file_size {
        return Err(TransferError::SourceMismatch {
            expected_name: session.file_name.clone(),
            expected_size: session.file_size,
            actual_name: source.name().to_string(),
            actual_size: source.size(),
        });
    }
    Ok(())
}
