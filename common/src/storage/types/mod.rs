use serde::{Deserialize, Serialize};

pub mod question;
pub mod question_bank;

pub trait StoredObject: Serialize + for<'de> Deserialize<'de> {
    fn table_name() -> &'static str;
    fn get_id(&self) -> &str;
}

/// Declares a SurrealDB-backed struct: an `id`, `created_at`/`updated_at`
/// timestamps stored as SurrealDB datetimes, the listed domain fields, and a
/// `StoredObject` impl. One invocation per module, since the generated
/// serde shims are module-scoped.
#[macro_export]
macro_rules! stored_object {
    ($name:ident, $table:expr, {$($(#[$attr:meta])* $field:ident: $ty:ty),*}) => {
        fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            $crate::storage::serde_helpers::flexible_id(deserializer)
        }

        fn serialize_datetime<S>(
            date: &chrono::DateTime<chrono::Utc>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            $crate::storage::serde_helpers::serialize_datetime(date, serializer)
        }

        fn deserialize_datetime<'de, D>(
            deserializer: D,
        ) -> Result<chrono::DateTime<chrono::Utc>, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            $crate::storage::serde_helpers::deserialize_datetime(deserializer)
        }

        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
        pub struct $name {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            pub id: String,
            #[serde(
                serialize_with = "serialize_datetime",
                deserialize_with = "deserialize_datetime",
                default
            )]
            pub created_at: chrono::DateTime<chrono::Utc>,
            #[serde(
                serialize_with = "serialize_datetime",
                deserialize_with = "deserialize_datetime",
                default
            )]
            pub updated_at: chrono::DateTime<chrono::Utc>,
            $( $(#[$attr])* pub $field: $ty),*
        }

        impl $crate::storage::types::StoredObject for $name {
            fn table_name() -> &'static str {
                $table
            }

            fn get_id(&self) -> &str {
                &self.id
            }
        }
    };
}
