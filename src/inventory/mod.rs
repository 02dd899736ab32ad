pub mod backup;
pub mod codec;
pub mod models;
pub mod store;

pub use backup::{Backup, BackupEntry, BackupManager};
pub use codec::{decode_all, decode_line, encode_record};
pub use models::*;
pub use store::{InventoryStore, LoadedInventory, RepairReport, ValidationReport};
