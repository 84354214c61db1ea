//! Helpers shared across the crate that are not specific to one stage.
//!
//! - Statistical functions: Pearson correlation over partially missing data
//!   and cohort quantiles.
//! - Builder-style `with_*` method generation for configuration structs.

mod stats;

pub use stats::*;

#[macro_export]
macro_rules! with_field_fn {
    ($field_name: ident, $field_type: ty) => {
        paste::paste! {
            pub fn [<with_$field_name>](mut self, value: $field_type) -> Self {
            self.$field_name = value;
            self
            }
        }
    };
}
pub use with_field_fn;
