//! In-memory relational operations between loading and output.
//!
//! The processing layer operates on [`crate::types::DataSet`] values produced by ingestion:
//!
//! - [`filter`]: sentinel exclusion ([`exclude_sentinels`]) and plain row predicates
//! - [`dedup`]: grouping by key, ordered-first selection and distinct concatenation
//! - [`reduce`]: keyed statistics (distinct-bucket average, distinct collect, count)
//! - [`redact`]: owner-name redaction
//! - [`join`]: per-key [`AttributeTable`]s and the [`left_join`] onto the primary keys
//!
//! ## Example: group → table → join
//!
//! ```rust
//! use lotbuild::key::{derive_keys, EntityKey, KeyRule};
//! use lotbuild::processing::{group_by_key, left_join, AttributeTable, ColumnRule, ColumnSpec};
//! use lotbuild::types::{DataSet, DataType, Field, Schema, Value};
//!
//! let schema = Schema::new(vec![
//!     Field::new("pin", DataType::Utf8),
//!     Field::new("street", DataType::Utf8),
//! ]);
//! let ds = DataSet::new(
//!     schema,
//!     vec![
//!         vec![Value::Utf8("42".into()), Value::Utf8("Oak St".into())],
//!         vec![Value::Utf8("42".into()), Value::Utf8("Birch St".into())],
//!     ],
//! );
//! let keys = derive_keys(&ds, &KeyRule::Column("pin".into())).unwrap();
//! let (groups, _issues) = group_by_key("addresses", &ds, &keys);
//! let columns = [ColumnSpec {
//!     name: "address".into(),
//!     rule: ColumnRule::Concat { column: "street".into(), order_by: vec![] },
//!     redact: None,
//! }];
//! let table = AttributeTable::from_groups("addresses", &ds.schema, &groups, &columns, &[]).unwrap();
//!
//! let rows = left_join(&[EntityKey::from("42"), EntityKey::from("43")], &[table]);
//! assert_eq!(rows[0], vec![Value::Utf8("Birch St, Oak St".into())]);
//! assert_eq!(rows[1], vec![Value::Utf8("?".into())]);
//! ```

pub mod dedup;
pub mod filter;
pub mod join;
pub mod redact;
pub mod reduce;

pub use dedup::{concatenate, group_by_key, select_first, KeyedRows, SortOrder};
pub use filter::{exclude_sentinels, filter, Exclusion};
pub use join::{joined_fields, left_join, AttributeTable, ColumnRule, ColumnSpec, ReduceSpec};
pub use redact::OwnerRedaction;
pub use reduce::{reduce, BoundReduction, Reduction, AVERAGE_DECIMALS};
