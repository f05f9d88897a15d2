//! Conversion between ormflow values and SQLite storage classes.

use ormflow_proto::Value;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

/// Borrowed parameter binding.
pub(crate) struct Param<'a>(pub &'a Value);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Bool(b) => ToSqlOutput::from(i64::from(*b)),
            Value::Int32(i) => ToSqlOutput::from(i64::from(*i)),
            Value::Int64(i) | Value::Timestamp(i) => ToSqlOutput::from(*i),
            Value::Float64(f) => ToSqlOutput::from(*f),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Read one result cell. Integers come back as `Int64`; the engine narrows
/// them to the column type.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_binds_as_integer() {
        let value = Value::Bool(true);
        let param = Param(&value);
        let output = param.to_sql().unwrap();
        assert_eq!(output, ToSqlOutput::from(1i64));
    }

    #[test]
    fn test_text_round_trip() {
        assert_eq!(
            from_sql(ValueRef::Text(b"kids")),
            Value::String("kids".into())
        );
        assert_eq!(from_sql(ValueRef::Integer(3)), Value::Int64(3));
    }
}
