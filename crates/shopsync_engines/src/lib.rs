#![forbid(unsafe_code)]

pub mod fetch;
pub mod locator;
pub mod row_codec;
pub mod schema;
