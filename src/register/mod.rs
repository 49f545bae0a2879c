pub mod application;
pub mod datalink;
