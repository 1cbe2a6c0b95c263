//! Raw archive access port.

use crate::domain::error::FxsweepError;

/// Supplies zip archives of raw price records for an instrument prefix.
pub trait RecordSource {
    /// Archive names for `prefix`, in the order they should be read.
    fn list_archives(&self, prefix: &str) -> Result<Vec<String>, FxsweepError>;

    /// Raw bytes of one archive returned by `list_archives`.
    fn read_archive(&self, name: &str) -> Result<Vec<u8>, FxsweepError>;
}
