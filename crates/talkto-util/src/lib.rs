pub mod pagination;
pub mod snowflake;
pub mod validation;
