//! Record - per-type mapping contract
//!
//! A storable type describes its fields once through [`Record::fields`] and
//! exchanges values as ordered `(field, Value)` pairs. Implementations are
//! normally generated with [`impl_record!`](crate::impl_record).

use crate::error::{Result, StoreError};
use crate::value::{FieldKind, FieldValue, Value};

/// How a record's key receives its value on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Integer key drawn from the table's sequence
    Generated,
    /// Key supplied by the caller
    Assigned,
}

impl KeyStrategy {
    /// Integer keys are generated unless stated otherwise
    pub fn infer(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Integer => KeyStrategy::Generated,
            _ => KeyStrategy::Assigned,
        }
    }
}

/// Field to column binding declared by a record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { name, column, kind }
    }
}

/// Column values of one row, addressed by column name (case-insensitive)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowValues {
    cells: Vec<(String, Value)>,
}

impl RowValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.cells.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Move a value out, yielding NULL for columns the row does not carry
    pub fn take(&mut self, column: &str) -> Value {
        self.cells
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| std::mem::replace(value, Value::Null))
            .unwrap_or(Value::Null)
    }

    /// Move a value out, or `None` when the row has no such column
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let index = self
            .cells
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(column))?;
        Some(self.cells.swap_remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, Value)> for RowValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

/// Storable record contract
pub trait Record: Sized {
    /// Default table name
    fn table_name() -> &'static str;

    /// Field descriptors, key first
    fn fields() -> Vec<FieldDescriptor>;

    /// Name of the field addressing the record
    fn key_field() -> &'static str;

    fn key_strategy() -> KeyStrategy;

    /// Field values in descriptor order
    fn to_values(&self) -> Vec<(&'static str, Value)>;

    fn from_values(row: &mut RowValues) -> Result<Self>;

    fn set_field(&mut self, field: &str, value: Value) -> Result<()>;

    fn get_field(&self, field: &str) -> Option<Value> {
        self.to_values()
            .into_iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    fn key_descriptor() -> Option<FieldDescriptor> {
        let key = Self::key_field();
        Self::fields().into_iter().find(|f| f.name == key)
    }

    fn key(&self) -> Value {
        self.get_field(Self::key_field()).unwrap_or(Value::Null)
    }

    fn set_key(&mut self, key: i64) -> Result<()> {
        self.set_field(Self::key_field(), Value::Integer(key))
    }
}

/// Storage kind of a field, resolved from an accessor
pub fn field_kind<R, T: FieldValue>(_accessor: impl Fn(&R) -> &T) -> FieldKind {
    T::KIND
}

/// Decode a value into a field, naming the field on failure
pub fn decode_field<T: FieldValue>(field: &str, value: Value) -> Result<T> {
    T::from_value(value).map_err(|e| StoreError::field(field, e))
}

/// Decode the column bound to `field`.
///
/// A row without that column leaves the field at its default, so a record
/// may declare fields its table does not have.
pub fn decode_column<T: FieldValue + Default>(
    row: &mut RowValues,
    field: &str,
    column: &str,
) -> Result<T> {
    match row.remove(column) {
        Some(value) => decode_field(field, value),
        None => Ok(T::default()),
    }
}

/// Implement [`Record`] for a plain struct.
///
/// Every struct field must be listed and implement `Default`, which fills
/// fields whose column is absent from a row. `=> "Column"` overrides the column
/// name, `in "table"` overrides the table name, and the key may carry
/// `(generated)` or `(assigned)`.
///
/// ```
/// use keel_core::impl_record;
///
/// struct Album {
///     album_id: i64,
///     title: String,
///     artist_id: i64,
/// }
///
/// impl_record!(Album in "albums" {
///     key album_id => "AlbumId",
///     title => "Title",
///     artist_id => "ArtistId",
/// });
/// ```
#[macro_export]
macro_rules! impl_record {
    (@table $ty:ident) => { stringify!($ty) };
    (@table $ty:ident $table:literal) => { $table };
    (@column $field:ident) => { stringify!($field) };
    (@column $field:ident $column:literal) => { $column };
    (@strategy $ty:ident $key:ident) => {
        $crate::KeyStrategy::infer($crate::field_kind(|r: &$ty| &r.$key))
    };
    (@strategy $ty:ident $key:ident generated) => { $crate::KeyStrategy::Generated };
    (@strategy $ty:ident $key:ident assigned) => { $crate::KeyStrategy::Assigned };
    (
        $ty:ident $(in $table:literal)? {
            key $key:ident $(=> $key_column:literal)? $(($strategy:ident))?,
            $($field:ident $(=> $column:literal)?),* $(,)?
        }
    ) => {
        impl $crate::Record for $ty {
            fn table_name() -> &'static str {
                $crate::impl_record!(@table $ty $($table)?)
            }

            fn fields() -> Vec<$crate::FieldDescriptor> {
                vec![
                    $crate::FieldDescriptor::new(
                        stringify!($key),
                        $crate::impl_record!(@column $key $($key_column)?),
                        $crate::field_kind(|r: &$ty| &r.$key),
                    ),
                    $(
                        $crate::FieldDescriptor::new(
                            stringify!($field),
                            $crate::impl_record!(@column $field $($column)?),
                            $crate::field_kind(|r: &$ty| &r.$field),
                        ),
                    )*
                ]
            }

            fn key_field() -> &'static str {
                stringify!($key)
            }

            fn key_strategy() -> $crate::KeyStrategy {
                $crate::impl_record!(@strategy $ty $key $($strategy)?)
            }

            fn to_values(&self) -> Vec<(&'static str, $crate::Value)> {
                vec![
                    (stringify!($key), $crate::FieldValue::to_value(&self.$key)),
                    $((stringify!($field), $crate::FieldValue::to_value(&self.$field)),)*
                ]
            }

            fn from_values(row: &mut $crate::RowValues) -> $crate::Result<Self> {
                Ok(Self {
                    $key: $crate::decode_column(
                        row,
                        stringify!($key),
                        $crate::impl_record!(@column $key $($key_column)?),
                    )?,
                    $(
                        $field: $crate::decode_column(
                            row,
                            stringify!($field),
                            $crate::impl_record!(@column $field $($column)?),
                        )?,
                    )*
                })
            }

            fn set_field(&mut self, field: &str, value: $crate::Value) -> $crate::Result<()> {
                match field {
                    stringify!($key) => {
                        self.$key = $crate::decode_field(stringify!($key), value)?;
                    }
                    $(
                        stringify!($field) => {
                            self.$field = $crate::decode_field(stringify!($field), value)?;
                        }
                    )*
                    other => {
                        return Err($crate::StoreError::Mapping(format!(
                            "unknown field `{}` on {}",
                            other,
                            stringify!($ty)
                        )));
                    }
                }
                Ok(())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq)]
    struct Client {
        client_id: i64,
        first_name: String,
        email: Option<String>,
    }

    crate::impl_record!(Client {
        key client_id => "ClientId",
        first_name => "FirstName",
        email,
    });

    #[derive(Debug, Clone, PartialEq)]
    struct Tag {
        id: Uuid,
        label: String,
    }

    crate::impl_record!(Tag in "tags" {
        key id,
        label,
    });

    #[derive(Debug, Clone, PartialEq)]
    struct Seat {
        number: i32,
        row_label: String,
    }

    crate::impl_record!(Seat {
        key number (assigned),
        row_label,
    });

    #[test]
    fn test_descriptors_follow_declaration() {
        assert_eq!(Client::table_name(), "Client");
        let fields = Client::fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(
            fields[0],
            FieldDescriptor::new("client_id", "ClientId", FieldKind::Integer)
        );
        assert_eq!(fields[2], FieldDescriptor::new("email", "email", FieldKind::Text));
        assert_eq!(Client::key_strategy(), KeyStrategy::Generated);
    }

    #[test]
    fn test_key_strategy_inference_and_override() {
        assert_eq!(Tag::table_name(), "tags");
        assert_eq!(Tag::key_strategy(), KeyStrategy::Assigned);
        assert_eq!(Seat::key_strategy(), KeyStrategy::Assigned);
        assert_eq!(Seat::key_descriptor().unwrap().kind, FieldKind::Integer);
    }

    #[test]
    fn test_values_round_trip_through_row() {
        let client = Client {
            client_id: 4,
            first_name: "Ada".into(),
            email: None,
        };
        let values = client.to_values();
        assert_eq!(values[0], ("client_id", Value::Integer(4)));

        let mut row: RowValues = vec![
            ("CLIENTID".to_string(), Value::Integer(4)),
            ("firstname".to_string(), Value::Text("Ada".into())),
            ("email".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();
        assert_eq!(Client::from_values(&mut row).unwrap(), client);
    }

    #[test]
    fn test_absent_column_leaves_field_default() {
        let mut row = RowValues::new();
        row.push("ClientId", Value::Integer(1));
        let client = Client::from_values(&mut row).unwrap();
        assert_eq!(
            client,
            Client {
                client_id: 1,
                first_name: String::new(),
                email: None,
            }
        );
    }

    #[test]
    fn test_null_in_present_column_is_rejected() {
        let mut row = RowValues::new();
        row.push("ClientId", Value::Integer(1));
        row.push("FirstName", Value::Null);
        let err = Client::from_values(&mut row).unwrap_err();
        assert!(err.to_string().contains("first_name"));
    }

    #[test]
    fn test_set_key_and_unknown_field() {
        let mut client = Client {
            client_id: 0,
            first_name: "A".into(),
            email: None,
        };
        client.set_key(9).unwrap();
        assert_eq!(client.key(), Value::Integer(9));
        assert!(matches!(
            client.set_field("nope", Value::Null),
            Err(StoreError::Mapping(_))
        ));
    }

    #[test]
    fn test_set_key_rejects_text_key() {
        let mut tag = Tag {
            id: Uuid::new_v4(),
            label: "x".into(),
        };
        assert!(tag.set_key(1).is_err());
    }
}
