//! Typed parameter rows for batch ingestion.
//!
//! Bulk staging never inspects element shapes at runtime. A collection is
//! ingestible when its element type implements `IntoSqlRow`, or when the
//! caller supplies an explicit per-element binder to
//! [`Statement::add_batch_with`](crate::query::Statement::add_batch_with).

use crate::types::SqlValue;

/// One ordered row of parameter values destined for batch staging.
///
/// Implemented for `Vec<SqlValue>` and for tuples of up to eight values,
/// each convertible into [`SqlValue`]. Values bind to slots 1..=N in tuple
/// order.
pub trait IntoSqlRow {
    /// Convert into an ordered row of parameter values.
    fn into_row(self) -> Vec<SqlValue>;
}

impl IntoSqlRow for Vec<SqlValue> {
    fn into_row(self) -> Vec<SqlValue> {
        self
    }
}

macro_rules! impl_into_sql_row_for_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Into<SqlValue>),+> IntoSqlRow for ($($name,)+) {
            fn into_row(self) -> Vec<SqlValue> {
                vec![$(self.$idx.into()),+]
            }
        }
    };
}

impl_into_sql_row_for_tuple!(A: 0);
impl_into_sql_row_for_tuple!(A: 0, B: 1);
impl_into_sql_row_for_tuple!(A: 0, B: 1, C: 2);
impl_into_sql_row_for_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_into_sql_row_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_into_sql_row_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_into_sql_row_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_into_sql_row_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
