//! # **Print Module** - *Bounded previews of buffer contents*
//!
//! Contains the preview helper behind the `Display` impls
//! and an additional `Print` trait which wraps it to provide
//! `mybuf.print()` for any object that implements it.
use std::fmt::{self, Display, Formatter};

pub(crate) const MAX_PREVIEW: usize = 50;

/// # Print
///
/// Provides a more convenient way to activate `Display`
/// for buffers via `mybuf.print()`,
/// avoiding the need to write `println!("{}", mybuf);`
pub trait Print {
    #[inline]
    fn print(&self)
    where
        Self: Display,
    {
        println!("{}", self);
    }
}

impl<T: Display> Print for T where T: Display {}

/// Writes `[a, b, c]`, eliding everything past `MAX_PREVIEW` values.
pub(crate) fn write_preview<T: Display>(f: &mut Formatter<'_>, values: &[T]) -> fmt::Result {
    write!(f, "[")?;

    for (i, v) in values.iter().take(MAX_PREVIEW).enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", v)?;
    }

    if values.len() > MAX_PREVIEW {
        write!(f, ", … ({} total)", values.len())?;
    }

    write!(f, "]")
}
