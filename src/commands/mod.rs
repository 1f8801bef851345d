pub mod calamari;
pub mod config;
pub mod install;
pub mod mon;
pub mod rgw;
