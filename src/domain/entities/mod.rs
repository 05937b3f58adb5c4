pub mod cart;
pub mod hygiene_sop;
pub mod product;
pub mod qr_code;
pub mod queue_entry;
pub mod scan_log;

pub use cart::{CartItem, WishlistItem};
pub use hygiene_sop::{
    CleaningProcedure, Confidence, FabricInference, HygieneSop, HygieneSteps, SopRecord, SopSource,
};
pub use product::{ConditionStatus, Product};
pub use qr_code::QrCode;
pub use queue_entry::{QueueEntry, QueuePayload};
pub use scan_log::{ScanLog, ScanStats};
