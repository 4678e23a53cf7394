//! Source document values and their conversion into schema-typed literals.

mod coerce;
mod document;
mod literal;
mod utf8;

pub use coerce::{
    as_boolean, as_datetime, as_number, as_string, coerce, normalize_id, parse_datetime_text,
    status_from_bool, to_stringish,
};
pub use document::{DocValue, Document};
pub use literal::{escape_literal, format_datetime, format_number_literal, Literal};
pub use utf8::{split_by_byte_limit, truncate_to_byte_limit, utf8_byte_length};
