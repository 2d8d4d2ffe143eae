//! Named-field destinations for composite results

use pgproc_core::{Result, Value};

/// A struct that can receive a composite row by member name.
///
/// Implement it with [`record!`](crate::record) rather than by hand. Members
/// are matched against catalog field names, so declaration order does not
/// matter.
pub trait Record: Default + Send + 'static {
    /// Member names in declaration order
    const MEMBERS: &'static [&'static str];

    fn record_name() -> &'static str;

    /// Convert `value` into member number `member` and store it
    fn assign(&mut self, member: usize, value: &Value) -> Result<()>;
}

/// Declare a struct and implement [`Record`] for it.
///
/// Every field type must implement `FromValue`, and the struct must derive
/// `Default` since set-returning calls build a fresh instance per row.
///
/// ```ignore
/// pgproc::record! {
///     #[derive(Debug, Default)]
///     pub struct Account {
///         pub id: i32,
///         pub name: String,
///     }
/// }
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::Record for $name {
            const MEMBERS: &'static [&'static str] = &[$(stringify!($field)),*];

            fn record_name() -> &'static str {
                stringify!($name)
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn assign(&mut self, member: usize, value: &$crate::Value) -> $crate::Result<()> {
                let mut index = 0usize;
                $(
                    if member == index {
                        self.$field = <$ty as $crate::FromValue>::from_value(value)?;
                        return Ok(());
                    }
                    index += 1;
                )*
                Err($crate::PgProcError::Driver(format!(
                    "{} has no member #{} ({} members)",
                    stringify!($name),
                    member,
                    index
                )))
            }
        }
    };
}
