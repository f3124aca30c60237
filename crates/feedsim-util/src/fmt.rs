use std::error::Error as StdError;
use std::fmt;

/// Wraps an error reference so its `Display` prints the whole `source()`
/// chain on a single line (`err: cause: cause`), instead of just the
/// outermost message.
///
/// Useful in `tracing` statements where a multi-line `Debug` dump would
/// break log formatting: `info!(err = %err.fmt_compact(), "...")`.
pub struct FmtCompactDisplay<'e>(&'e (dyn StdError + 'static));

impl fmt::Display for FmtCompactDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut cur = self.0.source();
        while let Some(source) = cur {
            write!(f, ": {source}")?;
            cur = source.source();
        }
        Ok(())
    }
}

/// Extension trait providing `.fmt_compact()` on any `std::error::Error`.
pub trait FmtCompact {
    fn fmt_compact(&self) -> FmtCompactDisplay<'_>;
}

impl<E> FmtCompact for E
where
    E: StdError + 'static,
{
    fn fmt_compact(&self) -> FmtCompactDisplay<'_> {
        FmtCompactDisplay(self)
    }
}
