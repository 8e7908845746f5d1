pub mod check;
pub mod clear_cache;
pub mod fix_orphans;
pub mod init;
pub mod populate;
pub mod reconcile;
