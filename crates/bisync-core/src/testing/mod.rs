pub mod fake_fs;
pub mod fake_transfer;
