pub mod global_product;
pub mod tenant;
