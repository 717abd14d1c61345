pub mod form;
pub mod legacy;
pub mod pdp;
pub mod records;
