pub mod asset;
pub mod oracle;
pub mod position;
pub mod vault;
