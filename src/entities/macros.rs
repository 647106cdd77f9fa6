//! Macros for reducing boilerplate when defining entities

/// Implement [`Entity`](crate::core::entity::Entity) for a stored type
///
/// # Example
/// ```rust,ignore
/// impl_entity!(TradingAccount,
///     collection: "accounts",
///     name: "account",
///     filterable: ["login", "status", "createdAt"],
/// );
///
/// // Nothing hidden from reads
/// impl_entity!(Transaction,
///     collection: "transactions",
///     name: "transaction",
///     filterable: ["kind", "amount"],
///     hidden: [],
/// );
/// ```
#[macro_export]
macro_rules! impl_entity {
    (
        $type:ty,
        collection: $collection:expr,
        name: $name:expr,
        filterable: [ $( $field:expr ),* $(,)? ]
        $(, hidden: [ $( $hidden:expr ),* $(,)? ] )?
        $(,)?
    ) => {
        impl $crate::core::entity::Entity for $type {
            fn collection_name() -> &'static str {
                $collection
            }

            fn entity_name() -> &'static str {
                $name
            }

            fn filterable_fields() -> &'static [&'static str] {
                &[ $( $field ),* ]
            }

            $(
                fn hidden_fields() -> &'static [&'static str] {
                    &[ $( $hidden ),* ]
                }
            )?
        }
    };
}

/// Define a `validator` custom function accepting only the listed values
///
/// Failures carry code `enum` and the allowed values under `values`.
#[macro_export]
macro_rules! one_of_validator {
    ($fn_name:ident, $allowed:expr) => {
        fn $fn_name(value: &str) -> Result<(), ::validator::ValidationError> {
            $crate::entities::check_one_of(value, $allowed)
        }
    };
}
