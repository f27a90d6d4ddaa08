pub mod patient;
pub mod token;
pub mod user;

use std::str::FromStr;

use crate::db::DatabaseError;

/// Parse a TEXT column into one of the wire enums, surfacing failures as
/// rusqlite conversion errors so row-mapping closures stay `rusqlite::Result`.
pub(crate) fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = DatabaseError>,
{
    value.parse().map_err(|e: DatabaseError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_column_opt<T>(idx: usize, value: Option<String>) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = DatabaseError>,
{
    value.map(|v| parse_column(idx, v)).transpose()
}
